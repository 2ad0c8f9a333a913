//! Transition conditions.
//!
//! A [`Condition`] is the authored form; a [`ConditionEval`] is its runtime twin.
//! The runtime result is recomputed whenever an operand changes and cached, so
//! polling transitions every tick only reads a bool.

use serde::{Deserialize, Serialize};

use crate::binding::{BindingHost, BindingPoint, Bindings, Expect};
use crate::error::GraphError;
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    BeTrue,
    Not,
    EqualTo,
    NotEqualTo,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
}

impl Operator {
    /// Whether the operator reads the right operand.
    pub fn is_binary(self) -> bool {
        !matches!(self, Operator::BeTrue | Operator::Not)
    }

    /// Whether the operator compares its operands for equality (kinds must match).
    pub fn is_equality(self) -> bool {
        matches!(self, Operator::EqualTo | Operator::NotEqualTo)
    }

    /// Whether the operator orders its operands (numbers only).
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Operator::LessThan
                | Operator::LessThanOrEqualTo
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqualTo
        )
    }

    fn operand_expect(self) -> Expect {
        if self.is_ordering() {
            Expect::Number
        } else {
            Expect::NumberOrBool
        }
    }
}

/// Authored condition: `lhs <operator> rhs`, where either operand may be bound to a variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub operator: Operator,
    pub lhs: Value,
    pub rhs: Option<Value>,
    bindings: Bindings,
}

impl Condition {
    pub fn new(operator: Operator, lhs: Value, rhs: Option<Value>) -> Self {
        Self {
            operator,
            lhs,
            rhs,
            bindings: Bindings::new(),
        }
    }

    /// `variable` is truthy.
    pub fn be_true(variable: &str) -> Self {
        let mut cond = Self::new(Operator::BeTrue, Value::Bool(false), None);
        cond.bindings.upsert(BindingPoint::Lhs, variable);
        cond
    }

    /// `variable <operator> rhs`.
    pub fn compare(variable: &str, operator: Operator, rhs: Value) -> Self {
        let lhs = if operator.is_ordering() {
            Value::Float(0.0)
        } else {
            rhs.kind().default_value()
        };
        let mut cond = Self::new(operator, lhs, Some(rhs));
        cond.bindings.upsert(BindingPoint::Lhs, variable);
        cond
    }

    /// Kind the operand at `point` must have. Equality against a literal pins
    /// the bound side to the literal's kind.
    pub fn expect(&self, point: BindingPoint) -> Expect {
        if self.operator.is_equality() {
            let (other, literal) = match point {
                BindingPoint::Rhs => (BindingPoint::Lhs, Some(self.lhs)),
                _ => (BindingPoint::Rhs, self.rhs),
            };
            if self.bindings.get(other).is_none() {
                if let Some(value) = literal {
                    return Expect::kind(value.kind());
                }
            }
        }
        self.operator.operand_expect()
    }

    /// Structural checks performed before a runtime condition is built.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.operator.is_binary()
            && self.rhs.is_none()
            && self.bindings.get(BindingPoint::Rhs).is_none()
        {
            return Err(GraphError::InvalidCondition(format!(
                "{:?} requires a right operand",
                self.operator
            )));
        }
        if self.operator.is_equality() && self.bindings.is_empty() {
            if let Some(rhs) = self.rhs {
                if rhs.kind() != self.lhs.kind() {
                    return Err(GraphError::InvalidCondition(format!(
                        "{:?} compares a {} with a {}",
                        self.operator,
                        self.lhs.kind().as_str(),
                        rhs.kind().as_str()
                    )));
                }
            }
        }
        if self.operator.is_ordering() {
            let lhs_literal_bool =
                self.bindings.get(BindingPoint::Lhs).is_none() && self.lhs.as_bool().is_some();
            let rhs_literal_bool = self.bindings.get(BindingPoint::Rhs).is_none()
                && self.rhs.and_then(|r| r.as_bool()).is_some();
            if lhs_literal_bool || rhs_literal_bool {
                return Err(GraphError::InvalidCondition(format!(
                    "{:?} compares numbers, found a bool operand",
                    self.operator
                )));
            }
        }
        Ok(())
    }

    /// Build the runtime evaluator from the authored operands.
    pub fn create_eval(&self) -> ConditionEval {
        ConditionEval::new(self.operator, self.lhs, self.rhs)
    }
}

impl BindingHost for Condition {
    fn host_name(&self) -> &'static str {
        "Condition"
    }

    fn accepts(&self, point: BindingPoint) -> bool {
        match point {
            BindingPoint::Lhs => true,
            BindingPoint::Rhs => self.operator.is_binary(),
            _ => false,
        }
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

/// Runtime condition with a cached result.
#[derive(Clone, Debug)]
pub struct ConditionEval {
    operator: Operator,
    lhs: Value,
    rhs: Option<Value>,
    result: bool,
}

impl ConditionEval {
    pub fn new(operator: Operator, lhs: Value, rhs: Option<Value>) -> Self {
        let mut eval = Self {
            operator,
            lhs,
            rhs,
            result: false,
        };
        eval.recompute();
        eval
    }

    pub fn set_lhs(&mut self, value: Value) {
        self.lhs = value;
        self.recompute();
    }

    pub fn set_rhs(&mut self, value: Value) {
        self.rhs = Some(value);
        self.recompute();
    }

    /// Cached result of the last operand change.
    #[inline]
    pub fn eval(&self) -> bool {
        self.result
    }

    fn recompute(&mut self) {
        let lhs = self.lhs;
        self.result = match self.operator {
            Operator::BeTrue => lhs.truthy(),
            Operator::Not => !lhs.truthy(),
            Operator::EqualTo => self.rhs.map_or(false, |rhs| lhs == rhs),
            Operator::NotEqualTo => self.rhs.map_or(true, |rhs| lhs != rhs),
            op => match (lhs.as_float(), self.rhs.and_then(|r| r.as_float())) {
                (Some(a), Some(b)) => match op {
                    Operator::LessThan => a < b,
                    Operator::LessThanOrEqualTo => a <= b,
                    Operator::GreaterThan => a > b,
                    _ => a >= b,
                },
                _ => false,
            },
        };
    }
}
