//! Identifiers for asset nodes and runtime arena slots.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identity of an authored subgraph. Every node id carries the id of its owner
/// so that nodes from one subgraph cannot be wired into another.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubgraphId(pub u32);

static NEXT_SUBGRAPH: AtomicU32 = AtomicU32::new(0);

impl SubgraphId {
    /// Allocate a process-unique subgraph id.
    pub(crate) fn alloc() -> Self {
        SubgraphId(NEXT_SUBGRAPH.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle of a node inside its owning subgraph. Indices stay stable when other
/// nodes are removed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId {
    pub(crate) owner: SubgraphId,
    pub(crate) index: u32,
}

impl NodeId {
    pub fn owner(&self) -> SubgraphId {
        self.owner
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.owner.0)
    }
}

/// Runtime subgraph evaluator slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubgraphEvalId(pub u32);

/// Runtime pose evaluator slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PoseEvalId(pub u32);

/// Runtime condition evaluator slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ConditionId(pub u32);

/// Runtime variable slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VarId(pub u32);
