//! Runtime evaluation of a [`PoseGraph`].
//!
//! [`PoseGraphEval`] builds a private runtime tree from an immutable asset and a
//! target [`Skeleton`], then drives it once per frame:
//!
//! - [`variables`] owns the evaluator's copy of the asset variables and the
//!   subscriptions created when bindings are resolved.
//! - [`build`] turns the asset into the runtime tree, failing fast on structural
//!   and binding errors.
//! - [`tree`] hosts the per-subgraph state machines and their update loop.
//! - [`layer`] composites each layer's root subgraph into the shared blend buffer.
//!
//! Several evaluators may be built from the same asset; they share nothing mutable.

mod build;
mod layer;
mod tree;
mod variables;

#[cfg(test)]
mod tests;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::blend_buffer::BlendBuffer;
use crate::config::Config;
use crate::error::EvalError;
use crate::graph::PoseGraph;
use crate::skeleton::Skeleton;
use crate::value::Value;

use build::TreeBuilder;
use layer::LayerEval;
use tree::EvalTree;
use variables::VariableStore;

/// Current node of a layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
}

/// Snapshot of a layer's transition in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionInfo {
    pub from: String,
    pub to: String,
    pub duration: f32,
    /// Seconds of the cross-fade consumed so far.
    pub progress: f32,
    /// Blend ratio in [0, 1] given to the target node.
    pub ratio: f32,
}

/// Evaluator for one pose graph bound to one skeleton.
#[derive(Debug)]
pub struct PoseGraphEval {
    config: Config,
    variables: VariableStore,
    tree: EvalTree,
    layers: Vec<LayerEval>,
    buffer: BlendBuffer,
    skeleton: Skeleton,
}

impl PoseGraphEval {
    pub fn new(graph: &PoseGraph, skeleton: Skeleton) -> Result<Self, EvalError> {
        Self::with_config(graph, skeleton, Config::default())
    }

    pub fn with_config(graph: &PoseGraph, skeleton: Skeleton, config: Config) -> Result<Self, EvalError> {
        let mut variables = VariableStore::from_graph(graph);
        let mut builder = TreeBuilder::new(&mut variables, &skeleton, &config);
        let layers = graph
            .layers()
            .iter()
            .map(|layer| builder.build_layer(layer))
            .collect::<Result<Vec<_>, _>>()?;
        let tree = builder.finish();
        let buffer = BlendBuffer::new(&skeleton);
        debug!(
            "pose graph evaluator built: {} layers, {} bones",
            layers.len(),
            skeleton.len()
        );
        Ok(Self {
            config,
            variables,
            tree,
            layers,
            buffer,
            skeleton,
        })
    }

    /// Advance every layer by `dt` seconds, then apply the blend buffer to the skeleton.
    pub fn update(&mut self, dt: f32) {
        let dt = if dt.is_finite() && dt >= 0.0 {
            dt
        } else {
            debug!("ignoring invalid delta time {dt}");
            0.0
        };
        for layer in &self.layers {
            layer.tick(&mut self.tree, &mut self.buffer, dt);
        }
        self.buffer.apply(&mut self.skeleton);
    }

    pub fn get_value(&self, name: &str) -> Option<Value> {
        self.variables.get(name)
    }

    /// Write a variable and notify every binding that reads it.
    ///
    /// Unknown names are ignored. Writing a value of the wrong kind is rejected.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), EvalError> {
        let value = value.into();
        let subscribers = self.variables.set(name, value)?;
        for subscriber in subscribers {
            self.tree.notify(subscriber, value);
        }
        Ok(())
    }

    /// Name of the current node of `layer`.
    pub fn current_node_info(&self, layer: usize) -> Result<NodeInfo, EvalError> {
        let root = self.tree.subgraph(self.layer(layer)?.root);
        Ok(NodeInfo {
            name: root.nodes[root.current].name.clone(),
        })
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Whether the root subgraph of `layer` reached its exit node.
    pub fn exited(&self, layer: usize) -> Result<bool, EvalError> {
        Ok(self.layer(layer)?.exited(&self.tree))
    }

    pub fn current_transition(&self, layer: usize) -> Result<Option<TransitionInfo>, EvalError> {
        let root = self.tree.subgraph(self.layer(layer)?.root);
        Ok(root.transition.map(|active| TransitionInfo {
            from: root.nodes[root.current].name.clone(),
            to: root.nodes[active.to].name.clone(),
            duration: active.duration,
            progress: active.progress,
            ratio: active.ratio(),
        }))
    }

    /// Pose nodes currently playing in `layer` (nested subgraphs included) with their weights.
    pub fn active_poses(&self, layer: usize) -> Result<Vec<(String, f32)>, EvalError> {
        let root = self.layer(layer)?.root;
        let mut out = Vec::new();
        self.tree.collect_active_poses(root, &mut out);
        Ok(out)
    }

    pub fn layer_name(&self, layer: usize) -> Result<&str, EvalError> {
        Ok(self.layer(layer)?.name.as_str())
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn layer(&self, index: usize) -> Result<&LayerEval, EvalError> {
        self.layers.get(index).ok_or(EvalError::LayerOutOfRange {
            index,
            count: self.layers.len(),
        })
    }
}
