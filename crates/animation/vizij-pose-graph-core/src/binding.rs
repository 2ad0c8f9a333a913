//! Binding points and the author-time binding table.
//!
//! Authorable objects (conditions, pose nodes, blend poses) declare which
//! [`BindingPoint`]s they support. A [`Bindings`] table maps each bound point to a
//! variable name. Names are resolved once when the runtime tree is built; after
//! that variable writes reach evaluators through subscriptions, never by name.

use log::warn;

use crate::error::GraphError;
use crate::value::ValueKind;

/// A named parameter slot on an authorable object.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BindingPoint {
    /// Left operand of a condition.
    Lhs,
    /// Right operand of a condition.
    Rhs,
    /// Playback rate of a pose node.
    Speed,
    /// Start offset of a pose node, read once at construction.
    StartRatio,
    /// Author weight of the i-th child of a direct blend.
    Weight(usize),
    /// Blend parameter of a 1D blend.
    Param,
}

/// Kinds a binding point can consume.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Expect {
    Number,
    Bool,
    NumberOrBool,
}

impl Expect {
    /// Exactly `kind`.
    pub fn kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Float => Expect::Number,
            ValueKind::Bool => Expect::Bool,
        }
    }

    pub fn admits(self, kind: ValueKind) -> bool {
        match self {
            Expect::Number => kind == ValueKind::Float,
            Expect::Bool => kind == ValueKind::Bool,
            Expect::NumberOrBool => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Expect::Number => "float",
            Expect::Bool => "bool",
            Expect::NumberOrBool => "float or bool",
        }
    }
}

/// Binding point -> variable name, in the order points were bound.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    rows: Vec<(BindingPoint, String)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the variable bound to `point`.
    pub fn upsert(&mut self, point: BindingPoint, variable: &str) {
        if let Some(row) = self.rows.iter_mut().find(|(p, _)| *p == point) {
            row.1 = variable.to_string();
        } else {
            self.rows.push((point, variable.to_string()));
        }
    }

    pub fn remove(&mut self, point: BindingPoint) -> Option<String> {
        let idx = self.rows.iter().position(|(p, _)| *p == point)?;
        Some(self.rows.remove(idx).1)
    }

    pub fn get(&self, point: BindingPoint) -> Option<&str> {
        self.rows
            .iter()
            .find_map(|(p, v)| if *p == point { Some(v.as_str()) } else { None })
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingPoint, &str)> {
        self.rows.iter().map(|(p, v)| (*p, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Objects exposing binding points.
pub trait BindingHost {
    /// Short type name used in diagnostics.
    fn host_name(&self) -> &'static str;

    fn accepts(&self, point: BindingPoint) -> bool;

    fn bindings(&self) -> &Bindings;

    fn bindings_mut(&mut self) -> &mut Bindings;

    /// Bind `point` to the variable `variable`.
    fn bind(&mut self, point: BindingPoint, variable: &str) -> Result<(), GraphError> {
        if !self.accepts(point) {
            warn!("{:?} is not a binding point of {}", point, self.host_name());
            return Err(GraphError::UnknownBindingPoint {
                host: self.host_name(),
                point,
            });
        }
        self.bindings_mut().upsert(point, variable);
        Ok(())
    }

    fn unbind(&mut self, point: BindingPoint) -> Option<String> {
        self.bindings_mut().remove(point)
    }

    fn binding(&self, point: BindingPoint) -> Option<&str> {
        self.bindings().get(point)
    }
}
