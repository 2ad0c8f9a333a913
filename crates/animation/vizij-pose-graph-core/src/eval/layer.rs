//! Layer evaluator: one root subgraph composited into the blend buffer.

use crate::blend_buffer::BlendBuffer;
use crate::graph::LayerBlending;
use crate::ids::SubgraphEvalId;

use super::tree::EvalTree;

#[derive(Debug)]
pub(crate) struct LayerEval {
    pub(crate) name: String,
    pub(crate) root: SubgraphEvalId,
    pub(crate) blending: LayerBlending,
}

impl LayerEval {
    /// Advance the layer and push its poses into `buffer`.
    /// A layer whose root subgraph reached its exit node is frozen.
    pub(crate) fn tick(&self, tree: &mut EvalTree, buffer: &mut BlendBuffer, dt: f32) {
        if tree.subgraph(self.root).exited() {
            return;
        }
        tree.update_subgraph(self.root, dt);
        if tree.subgraph(self.root).exited() {
            return;
        }
        buffer.begin_layer(self.blending);
        tree.sample_subgraph(self.root, buffer);
        buffer.end_layer();
    }

    pub(crate) fn exited(&self, tree: &EvalTree) -> bool {
        tree.subgraph(self.root).exited()
    }
}
