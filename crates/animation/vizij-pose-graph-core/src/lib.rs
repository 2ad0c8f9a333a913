//! Vizij Pose Graph Core (engine-agnostic)
//!
//! Layered animation state machines evaluated against a skeleton. A
//! [`PoseGraph`] is the immutable authored asset: variables, layers, nested
//! subgraphs of pose nodes, and conditional cross-fade transitions. A
//! [`PoseGraphEval`] binds one asset to one [`Skeleton`] and advances it once per
//! frame, compositing every layer through a shared [`BlendBuffer`].
//!
//! Assets can be built in code through the graph API or loaded from JSON with
//! [`parse_pose_graph_json`].

pub mod binding;
pub mod blend_buffer;
pub mod clip;
pub mod condition;
pub mod config;
pub mod document;
pub mod error;
pub mod eval;
pub mod graph;
pub mod ids;
pub mod math;
pub mod pose;
pub mod skeleton;
pub mod value;

// Re-exports for hosts
pub use binding::{BindingHost, BindingPoint, Bindings};
pub use blend_buffer::BlendBuffer;
pub use clip::{BoneTrack, ClipSampler, TransformClip, TransformKey, WrapMode};
pub use condition::{Condition, Operator};
pub use config::Config;
pub use document::{parse_pose_graph_json, PoseGraphDocument};
pub use error::{BindError, DocumentError, EvalError, GraphError, InvalidTransitionKind};
pub use eval::{NodeInfo, PoseGraphEval, TransitionInfo};
pub use graph::{
    GraphNode, Layer, LayerBlending, NodeKind, PoseGraph, PoseNode, PoseSubgraph, Transition,
    DEFAULT_TRANSITION_DURATION,
};
pub use ids::{NodeId, SubgraphId};
pub use math::Transform;
pub use pose::{ClipPose, Pose, PoseBlend1D, PoseBlendDirect};
pub use skeleton::{Bone, Skeleton, SkeletonMask};
pub use value::{Value, ValueKind, Variable};
