//! Construction of the runtime tree from an asset.
//!
//! Binding names are resolved here, once. Every bound point becomes a
//! [`Subscriber`] in the variable store and is initialised with the variable's
//! current value. Structural problems abort construction.

use log::warn;

use crate::binding::{BindingHost, BindingPoint, Expect};
use crate::condition::Condition;
use crate::config::Config;
use crate::error::{EvalError, GraphError, InvalidTransitionKind};
use crate::graph::{Layer, NodeKind, PoseNode, PoseSubgraph};
use crate::ids::{ConditionId, NodeId, PoseEvalId, SubgraphEvalId};
use crate::pose::{PoseEvalContext, Poseable};
use crate::skeleton::{Skeleton, SkeletonMask};
use crate::value::Value;

use super::layer::LayerEval;
use super::tree::{EvalTree, NodeEval, NodeEvalKind, PoseNodeEval, SubgraphEval, TransitionEval};
use super::variables::{Subscriber, VariableStore};

fn number(value: Value) -> f32 {
    value.as_float().unwrap_or(0.0)
}

pub(crate) struct TreeBuilder<'a> {
    tree: EvalTree,
    vars: &'a mut VariableStore,
    skeleton: &'a Skeleton,
    config: &'a Config,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(vars: &'a mut VariableStore, skeleton: &'a Skeleton, config: &'a Config) -> Self {
        Self {
            tree: EvalTree::new(config.trace_transitions),
            vars,
            skeleton,
            config,
        }
    }

    pub(crate) fn build_layer(&mut self, layer: &Layer) -> Result<LayerEval, EvalError> {
        let root = self.build_subgraph(layer.graph(), &layer.name, layer.weight, layer.mask.as_ref())?;
        Ok(LayerEval {
            name: layer.name.clone(),
            root,
            blending: layer.blending,
        })
    }

    pub(crate) fn finish(self) -> EvalTree {
        self.tree
    }

    fn build_subgraph(
        &mut self,
        graph: &PoseSubgraph,
        name: &str,
        weight: f32,
        mask: Option<&SkeletonMask>,
    ) -> Result<SubgraphEvalId, EvalError> {
        // Asset slot index -> runtime node index.
        let mut slots: Vec<Option<usize>> = vec![None; graph.slot_count()];
        let mut nodes = Vec::new();
        for (id, node) in graph.nodes() {
            let kind = match &node.kind {
                NodeKind::Entry => NodeEvalKind::Entry,
                NodeKind::Exit => NodeEvalKind::Exit,
                NodeKind::Any => NodeEvalKind::Any,
                NodeKind::Pose(pose_node) => NodeEvalKind::Pose(self.build_pose_node(pose_node, mask)?),
                NodeKind::Subgraph(sub) => {
                    NodeEvalKind::Subgraph(self.build_subgraph(sub, &node.name, weight, mask)?)
                }
            };
            slots[id.index()] = Some(nodes.len());
            nodes.push(NodeEval {
                name: node.name.clone(),
                kind,
                outgoing: Vec::new(),
            });
        }

        let lookup = |id: NodeId| -> Option<usize> {
            if id.owner() != graph.id() {
                return None;
            }
            slots.get(id.index()).copied().flatten()
        };
        let special = |id: NodeId, kind: NodeEvalKind, label: &'static str| -> Result<usize, GraphError> {
            match lookup(id) {
                Some(i) if nodes[i].kind == kind => Ok(i),
                _ => Err(GraphError::MissingSpecialNode(label)),
            }
        };
        let entry = special(graph.entry_node(), NodeEvalKind::Entry, "entry")?;
        let exit = special(graph.exit_node(), NodeEvalKind::Exit, "exit")?;
        let any = special(graph.any_node(), NodeEvalKind::Any, "any")?;

        let mut outgoing: Vec<(usize, TransitionEval)> = Vec::new();
        for t in graph.transitions() {
            let endpoint = |id: NodeId| {
                lookup(id).ok_or_else(|| GraphError::BadMapping(format!("transition endpoint {id} has no runtime node")))
            };
            let from = endpoint(t.from())?;
            let to = endpoint(t.to())?;
            if to == entry {
                return Err(GraphError::InvalidTransition(InvalidTransitionKind::ToEntry).into());
            }
            if to == any {
                return Err(GraphError::InvalidTransition(InvalidTransitionKind::ToAny).into());
            }
            if from == exit {
                return Err(GraphError::InvalidTransition(InvalidTransitionKind::FromExit).into());
            }

            let duration = if t.duration.is_finite() && t.duration >= 0.0 {
                t.duration
            } else {
                warn!("subgraph '{name}': transition duration {} treated as 0", t.duration);
                0.0
            };
            let condition = t
                .condition
                .as_ref()
                .map(|c| self.build_condition(c))
                .transpose()?;
            outgoing.push((
                from,
                TransitionEval {
                    to,
                    duration,
                    condition,
                    exit_condition: t.exit_condition,
                    target_stretch: 1.0,
                },
            ));
        }
        for (from, transition) in outgoing {
            nodes[from].outgoing.push(transition);
        }

        let step_cap = self.config.step_cap(graph.transitions().count());
        Ok(self
            .tree
            .push_subgraph(SubgraphEval::new(name, nodes, entry, exit, any, weight, step_cap)))
    }

    fn build_pose_node(
        &mut self,
        node: &PoseNode,
        mask: Option<&SkeletonMask>,
    ) -> Result<PoseEvalId, EvalError> {
        let id = self.tree.next_pose_id();

        let mut speed = node.speed;
        if let Some(var) = node.binding(BindingPoint::Speed) {
            speed = number(self.vars.bind(var, Expect::Number, Subscriber::PoseSpeed(id))?);
        }
        let mut start_ratio = node.start_ratio;
        if let Some(var) = node.binding(BindingPoint::StartRatio) {
            start_ratio = number(self.vars.read(var, Expect::Number)?);
        }

        let ctx = PoseEvalContext {
            skeleton: self.skeleton,
            mask,
            speed,
            start_ratio,
        };
        let mut pose = node.pose.as_ref().and_then(|p| p.create_eval(&ctx));

        if let (Some(eval), Some(authored)) = (pose.as_mut(), node.pose.as_ref()) {
            let mut rows: Vec<(Vec<usize>, BindingPoint, String)> = Vec::new();
            authored.visit_binding_hosts(&mut Vec::new(), &mut |path, host| {
                for (point, var) in host.bindings().iter() {
                    rows.push((path.to_vec(), point, var.to_string()));
                }
            });
            for (path, point, var) in rows {
                let subscriber = Subscriber::PoseParam {
                    pose: id,
                    path: path.clone(),
                    point,
                };
                let value = self.vars.bind(&var, Expect::Number, subscriber)?;
                eval.set_param(&path, point, number(value));
            }
        }

        Ok(self.tree.push_pose(PoseNodeEval { pose }))
    }

    fn build_condition(&mut self, condition: &Condition) -> Result<ConditionId, EvalError> {
        condition.validate()?;
        let id = self.tree.next_condition_id();
        let mut eval = condition.create_eval();
        // Two bound equality operands must share the kind of the first one bound.
        let mut pinned = None;
        for (point, var) in condition.bindings().iter() {
            let subscriber = match point {
                BindingPoint::Lhs => Subscriber::ConditionLhs(id),
                BindingPoint::Rhs => Subscriber::ConditionRhs(id),
                other => {
                    return Err(GraphError::UnknownBindingPoint {
                        host: condition.host_name(),
                        point: other,
                    }
                    .into())
                }
            };
            let expect = match pinned {
                Some(kind) => Expect::kind(kind),
                None => condition.expect(point),
            };
            let value = self.vars.bind(var, expect, subscriber)?;
            if condition.operator.is_equality() {
                pinned = Some(value.kind());
            }
            if point == BindingPoint::Lhs {
                eval.set_lhs(value);
            } else {
                eval.set_rhs(value);
            }
        }
        Ok(self.tree.push_condition(eval))
    }
}
