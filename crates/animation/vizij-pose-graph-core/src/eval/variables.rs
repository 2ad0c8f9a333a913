//! Runtime variable store.
//!
//! Each evaluator owns a private copy of the asset's variables. Binding a
//! variable registers a [`Subscriber`]; writes hand the subscriber list back to
//! the caller, which forwards the new value into the evaluation tree.

use hashbrown::HashMap;
use log::trace;

use crate::binding::{BindingPoint, Expect};
use crate::error::BindError;
use crate::graph::PoseGraph;
use crate::ids::{ConditionId, PoseEvalId, VarId};
use crate::value::{Value, Variable};

/// Runtime object notified when a variable changes.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Subscriber {
    ConditionLhs(ConditionId),
    ConditionRhs(ConditionId),
    PoseSpeed(PoseEvalId),
    PoseParam {
        pose: PoseEvalId,
        path: Vec<usize>,
        point: BindingPoint,
    },
}

#[derive(Debug)]
struct VarSlot {
    name: String,
    variable: Variable,
    subscribers: Vec<Subscriber>,
}

#[derive(Debug, Default)]
pub(crate) struct VariableStore {
    slots: Vec<VarSlot>,
    index: HashMap<String, VarId>,
}

impl VariableStore {
    pub(crate) fn from_graph(graph: &PoseGraph) -> Self {
        let mut store = Self::default();
        for (name, variable) in graph.variables() {
            let id = VarId(store.slots.len() as u32);
            store.slots.push(VarSlot {
                name: name.to_string(),
                variable: variable.clone(),
                subscribers: Vec::new(),
            });
            store.index.insert(name.to_string(), id);
        }
        store
    }

    pub(crate) fn get(&self, name: &str) -> Option<Value> {
        self.slot(name).map(|s| s.variable.value())
    }

    /// Resolve `name` and check its kind against what the consumer expects.
    pub(crate) fn resolve(&self, name: &str, expect: Expect) -> Result<VarId, BindError> {
        let id = *self
            .index
            .get(name)
            .ok_or_else(|| BindError::VariableNotDefined(name.to_string()))?;
        let kind = self.slots[id.0 as usize].variable.kind();
        if !expect.admits(kind) {
            return Err(BindError::TypeMismatch {
                variable: name.to_string(),
                expected: expect.as_str(),
                found: kind,
            });
        }
        Ok(id)
    }

    /// Subscribe to `name`; returns the current value so the subscriber can initialise itself.
    pub(crate) fn bind(
        &mut self,
        name: &str,
        expect: Expect,
        subscriber: Subscriber,
    ) -> Result<Value, BindError> {
        let id = self.resolve(name, expect)?;
        let slot = &mut self.slots[id.0 as usize];
        slot.subscribers.push(subscriber);
        Ok(slot.variable.value())
    }

    /// Read once without subscribing.
    pub(crate) fn read(&self, name: &str, expect: Expect) -> Result<Value, BindError> {
        let id = self.resolve(name, expect)?;
        Ok(self.slots[id.0 as usize].variable.value())
    }

    /// Write `value`; returns the subscribers to notify. Unknown names are ignored.
    pub(crate) fn set(&mut self, name: &str, value: Value) -> Result<&[Subscriber], BindError> {
        let Some(&id) = self.index.get(name) else {
            trace!("write to undeclared variable '{name}' ignored");
            return Ok(&[]);
        };
        let slot = &mut self.slots[id.0 as usize];
        slot.variable
            .set(value)
            .map_err(|expected| BindError::TypeMismatch {
                variable: slot.name.clone(),
                expected: expected.as_str(),
                found: value.kind(),
            })?;
        trace!("variable '{name}' = {value:?}");
        Ok(&slot.subscribers)
    }

    pub(crate) fn subscriber_count(&self, name: &str) -> usize {
        self.slot(name).map_or(0, |s| s.subscribers.len())
    }

    fn slot(&self, name: &str) -> Option<&VarSlot> {
        self.index.get(name).map(|id| &self.slots[id.0 as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn store() -> VariableStore {
        let mut graph = PoseGraph::new();
        graph
            .add_variable("speed", ValueKind::Float, Some(Value::Float(0.5)))
            .unwrap();
        graph.add_variable("grounded", ValueKind::Bool, None).unwrap();
        VariableStore::from_graph(&graph)
    }

    #[test]
    fn bind_returns_current_value_and_registers() {
        let mut vars = store();
        let v = vars
            .bind("speed", Expect::Number, Subscriber::PoseSpeed(PoseEvalId(0)))
            .unwrap();
        assert_eq!(v, Value::Float(0.5));
        assert_eq!(vars.subscriber_count("speed"), 1);
        let subs = vars.set("speed", Value::Float(2.0)).unwrap();
        assert_eq!(subs, &[Subscriber::PoseSpeed(PoseEvalId(0))]);
        assert_eq!(vars.get("speed"), Some(Value::Float(2.0)));
    }

    #[test]
    fn bind_errors_name_the_variable() {
        let mut vars = store();
        let err = vars
            .bind("missing", Expect::Number, Subscriber::ConditionLhs(ConditionId(0)))
            .unwrap_err();
        assert_eq!(err, BindError::VariableNotDefined("missing".into()));

        let err = vars
            .bind("grounded", Expect::Number, Subscriber::ConditionLhs(ConditionId(0)))
            .unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { ref variable, .. } if variable == "grounded"));
        assert_eq!(vars.subscriber_count("grounded"), 0);
    }

    #[test]
    fn writes_check_kind_and_ignore_unknown_names() {
        let mut vars = store();
        assert!(vars.set("nope", Value::Float(1.0)).unwrap().is_empty());
        assert!(vars.set("grounded", Value::Float(1.0)).is_err());
        assert_eq!(vars.get("grounded"), Some(Value::Bool(false)));
        assert_eq!(vars.read("grounded", Expect::NumberOrBool).unwrap(), Value::Bool(false));
    }
}
