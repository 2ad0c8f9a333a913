//! JSON pose graph documents.
//!
//! A document declares variables, keyframed clips and layers. Nodes are
//! referenced by name within their subgraph; the special nodes are spelled
//! `@entry`, `@exit` and `@any`. Clips are shared between pose nodes by `Arc`.
//!
//! ```json
//! {
//!   "variables": { "speed": { "type": "float", "value": 0.0 } },
//!   "clips": [{ "name": "idle", "duration": 1.0, "tracks": [] }],
//!   "layers": [{
//!     "name": "Base",
//!     "blending": "override",
//!     "graph": {
//!       "nodes": [{ "kind": "pose", "name": "Idle", "pose": { "type": "clip", "clip": "idle" } }],
//!       "transitions": [{ "from": "@entry", "to": "Idle", "duration": 0.0 }]
//!     }
//!   }]
//! }
//! ```

use std::sync::Arc;

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::binding::{BindingHost, BindingPoint};
use crate::clip::{ClipSampler, TransformClip};
use crate::condition::{Condition, Operator};
use crate::error::DocumentError;
use crate::graph::{Layer, LayerBlending, PoseGraph, PoseSubgraph, DEFAULT_TRANSITION_DURATION};
use crate::ids::NodeId;
use crate::pose::{ClipPose, Pose, PoseBlend1D, PoseBlendDirect};
use crate::skeleton::SkeletonMask;
use crate::value::{Value, ValueKind};

fn one() -> f32 {
    1.0
}

fn default_duration() -> f32 {
    DEFAULT_TRANSITION_DURATION
}

#[derive(Debug, Default, Deserialize)]
pub struct PoseGraphDocument {
    #[serde(default)]
    pub variables: IndexMap<String, VariableDoc>,
    #[serde(default)]
    pub clips: Vec<TransformClip>,
    #[serde(default)]
    pub layers: Vec<LayerDoc>,
}

#[derive(Debug, Deserialize)]
pub struct VariableDoc {
    #[serde(rename = "type")]
    pub kind: ValueKind,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LayerDoc {
    pub name: String,
    #[serde(default = "one")]
    pub weight: f32,
    #[serde(default)]
    pub blending: LayerBlending,
    #[serde(default)]
    pub mask: Option<SkeletonMask>,
    #[serde(default)]
    pub graph: SubgraphDoc,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubgraphDoc {
    #[serde(default)]
    pub nodes: Vec<NodeDoc>,
    #[serde(default)]
    pub transitions: Vec<TransitionDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDoc {
    Pose {
        name: String,
        #[serde(default)]
        pose: Option<PoseDoc>,
        #[serde(default = "one")]
        speed: f32,
        #[serde(default)]
        start_ratio: f32,
        #[serde(default)]
        bindings: PoseNodeBindingsDoc,
    },
    Subgraph {
        name: String,
        #[serde(default)]
        graph: SubgraphDoc,
    },
}

impl NodeDoc {
    fn name(&self) -> &str {
        match self {
            NodeDoc::Pose { name, .. } | NodeDoc::Subgraph { name, .. } => name,
        }
    }
}

/// Variables bound to pose node parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PoseNodeBindingsDoc {
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub start_ratio: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoseDoc {
    Clip {
        clip: String,
    },
    BlendDirect {
        children: Vec<DirectChildDoc>,
    },
    #[serde(rename = "blend_1d")]
    Blend1D {
        #[serde(default)]
        param: f32,
        #[serde(default)]
        param_binding: Option<String>,
        children: Vec<Blend1DChildDoc>,
    },
}

#[derive(Debug, Deserialize)]
pub struct DirectChildDoc {
    #[serde(default)]
    pub pose: Option<PoseDoc>,
    #[serde(default = "one")]
    pub weight: f32,
    #[serde(default)]
    pub weight_binding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Blend1DChildDoc {
    #[serde(default)]
    pub pose: Option<PoseDoc>,
    pub threshold: f32,
}

#[derive(Debug, Deserialize)]
pub struct TransitionDoc {
    pub from: String,
    pub to: String,
    #[serde(default = "default_duration")]
    pub duration: f32,
    #[serde(default)]
    pub exit_condition: Option<f32>,
    #[serde(default)]
    pub condition: Option<ConditionDoc>,
}

#[derive(Debug, Deserialize)]
pub struct ConditionDoc {
    pub operator: Operator,
    pub lhs: Operand,
    #[serde(default)]
    pub rhs: Option<Operand>,
}

/// A literal value or `{ "var": "<name>" }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Variable { var: String },
    Literal(Value),
}

type ClipTable<'a> = HashMap<&'a str, Arc<dyn ClipSampler>>;

/// Parse a JSON document into a [`PoseGraph`].
pub fn parse_pose_graph_json(s: &str) -> Result<PoseGraph, DocumentError> {
    let doc: PoseGraphDocument = serde_json::from_str(s)?;
    doc.build()
}

impl PoseGraphDocument {
    pub fn build(&self) -> Result<PoseGraph, DocumentError> {
        let mut clips: ClipTable<'_> = HashMap::new();
        for clip in &self.clips {
            clip.validate_basic().map_err(DocumentError::InvalidClip)?;
            clips.insert(clip.name.as_str(), Arc::new(clip.clone()));
        }

        let mut graph = PoseGraph::new();
        for (name, var) in &self.variables {
            graph
                .add_variable(name, var.kind, var.value)
                .map_err(|source| DocumentError::Variable {
                    name: name.clone(),
                    source,
                })?;
        }

        for doc in &self.layers {
            let mut layer = Layer::new(&doc.name);
            layer.weight = doc.weight;
            layer.blending = doc.blending;
            layer.mask = doc.mask.clone();
            build_subgraph(&doc.graph, layer.graph_mut(), &doc.name, &clips)?;
            graph.push_layer(layer);
        }
        Ok(graph)
    }
}

fn build_subgraph(
    doc: &SubgraphDoc,
    target: &mut PoseSubgraph,
    subgraph_name: &str,
    clips: &ClipTable<'_>,
) -> Result<(), DocumentError> {
    let mut names: HashMap<&str, NodeId> = HashMap::new();
    names.insert("@entry", target.entry_node());
    names.insert("@exit", target.exit_node());
    names.insert("@any", target.any_node());

    for node in &doc.nodes {
        let name = node.name();
        if names.contains_key(name) {
            return Err(DocumentError::DuplicateNode {
                subgraph: subgraph_name.to_string(),
                name: name.to_string(),
            });
        }
        let id = match node {
            NodeDoc::Pose {
                pose,
                speed,
                start_ratio,
                bindings,
                ..
            } => {
                let pose = pose.as_ref().map(|p| build_pose(p, clips)).transpose()?;
                let id = target.add_pose_node(name);
                if let Some(pose_node) = target.pose_node_mut(id) {
                    pose_node.pose = pose;
                    pose_node.speed = *speed;
                    pose_node.start_ratio = *start_ratio;
                    if let Some(var) = &bindings.speed {
                        pose_node.bind(BindingPoint::Speed, var)?;
                    }
                    if let Some(var) = &bindings.start_ratio {
                        pose_node.bind(BindingPoint::StartRatio, var)?;
                    }
                }
                id
            }
            NodeDoc::Subgraph { graph, .. } => {
                let id = target.add_subgraph(name);
                if let Some(sub) = target.subgraph_mut(id) {
                    build_subgraph(graph, sub, name, clips)?;
                }
                id
            }
        };
        names.insert(name, id);
    }

    let resolve = |name: &str| {
        names
            .get(name)
            .copied()
            .ok_or_else(|| DocumentError::UnknownNode {
                subgraph: subgraph_name.to_string(),
                name: name.to_string(),
            })
    };
    for t in &doc.transitions {
        let from = resolve(&t.from)?;
        let to = resolve(&t.to)?;
        let condition = t.condition.as_ref().map(build_condition).transpose()?;
        let transition = target.connect(from, to, condition)?;
        transition.with_duration(t.duration);
        if let Some(ratio) = t.exit_condition {
            transition.set_exit_condition(ratio);
        }
    }
    Ok(())
}

fn build_pose(doc: &PoseDoc, clips: &ClipTable<'_>) -> Result<Pose, DocumentError> {
    let child = |pose: &Option<PoseDoc>| pose.as_ref().map(|p| build_pose(p, clips)).transpose();
    match doc {
        PoseDoc::Clip { clip } => {
            let sampler = clips
                .get(clip.as_str())
                .ok_or_else(|| DocumentError::UnknownClip(clip.clone()))?;
            Ok(ClipPose::new(Arc::clone(sampler)).into())
        }
        PoseDoc::BlendDirect { children } => {
            let poses = children
                .iter()
                .map(|c| -> Result<_, DocumentError> { Ok((child(&c.pose)?, c.weight)) })
                .collect::<Result<Vec<_>, _>>()?;
            let mut blend = PoseBlendDirect::new(poses);
            for (i, c) in children.iter().enumerate() {
                if let Some(var) = &c.weight_binding {
                    blend.bind(BindingPoint::Weight(i), var)?;
                }
            }
            Ok(blend.into())
        }
        PoseDoc::Blend1D {
            param,
            param_binding,
            children,
        } => {
            let poses = children
                .iter()
                .map(|c| -> Result<_, DocumentError> { Ok((child(&c.pose)?, c.threshold)) })
                .collect::<Result<Vec<_>, _>>()?;
            let mut blend = PoseBlend1D::new(poses, *param);
            if let Some(var) = param_binding {
                blend.bind(BindingPoint::Param, var)?;
            }
            Ok(blend.into())
        }
    }
}

fn build_condition(doc: &ConditionDoc) -> Result<Condition, DocumentError> {
    let mut condition = Condition::new(doc.operator, Value::Float(0.0), None);
    match &doc.lhs {
        Operand::Literal(value) => condition.lhs = *value,
        Operand::Variable { var } => condition.bind(BindingPoint::Lhs, var)?,
    }
    match &doc.rhs {
        None => {}
        Some(Operand::Literal(value)) => condition.rhs = Some(*value),
        Some(Operand::Variable { var }) => condition.bind(BindingPoint::Rhs, var)?,
    }
    Ok(condition)
}
