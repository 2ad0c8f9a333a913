//! Authored pose graph asset: layers of nested state machines plus variables.
//!
//! The asset is read-only while evaluators run; several evaluators may share
//! one `PoseGraph` against different skeletons.
//!
//! Each [`PoseSubgraph`] owns its nodes in a slot vector (removed nodes leave a
//! hole so [`NodeId`]s stay valid) and its transitions in declaration order.
//! Three special nodes (entry, exit, any) are created with the subgraph and
//! can never be removed.

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::binding::{BindingHost, BindingPoint, Bindings};
use crate::condition::Condition;
use crate::error::{BindError, GraphError, InvalidTransitionKind};
use crate::ids::{NodeId, SubgraphId};
use crate::pose::Pose;
use crate::skeleton::SkeletonMask;
use crate::value::{Value, ValueKind, Variable};

/// Default cross-fade length of a new transition, in seconds.
pub const DEFAULT_TRANSITION_DURATION: f32 = 0.3;

/// Leaf node playing a pose.
#[derive(Clone, Debug)]
pub struct PoseNode {
    pub pose: Option<Pose>,
    pub speed: f32,
    pub start_ratio: f32,
    bindings: Bindings,
}

impl Default for PoseNode {
    fn default() -> Self {
        Self {
            pose: None,
            speed: 1.0,
            start_ratio: 0.0,
            bindings: Bindings::new(),
        }
    }
}

impl BindingHost for PoseNode {
    fn host_name(&self) -> &'static str {
        "PoseNode"
    }

    fn accepts(&self, point: BindingPoint) -> bool {
        matches!(point, BindingPoint::Speed | BindingPoint::StartRatio)
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

#[derive(Debug)]
pub enum NodeKind {
    Entry,
    Exit,
    Any,
    Pose(PoseNode),
    Subgraph(Box<PoseSubgraph>),
}

#[derive(Debug)]
pub struct GraphNode {
    pub name: String,
    pub kind: NodeKind,
}

impl GraphNode {
    pub fn is_special(&self) -> bool {
        matches!(self.kind, NodeKind::Entry | NodeKind::Exit | NodeKind::Any)
    }

    pub fn as_pose(&self) -> Option<&PoseNode> {
        match &self.kind {
            NodeKind::Pose(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_pose_mut(&mut self) -> Option<&mut PoseNode> {
        match &mut self.kind {
            NodeKind::Pose(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_subgraph(&self) -> Option<&PoseSubgraph> {
        match &self.kind {
            NodeKind::Subgraph(s) => Some(s),
            _ => None,
        }
    }
}

/// Directed edge between two nodes of one subgraph.
#[derive(Clone, Debug)]
pub struct Transition {
    from: NodeId,
    to: NodeId,
    /// Cross-fade length in seconds.
    pub duration: f32,
    pub condition: Option<Condition>,
    /// Minimum normalized progress of the source pose before the transition may fire.
    pub exit_condition: Option<f32>,
}

impl Transition {
    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn with_duration(&mut self, duration: f32) -> &mut Self {
        self.duration = duration;
        self
    }

    /// Negative values disable exit-time gating.
    pub fn set_exit_condition(&mut self, ratio: f32) -> &mut Self {
        self.exit_condition = if ratio < 0.0 { None } else { Some(ratio) };
        self
    }
}

/// A state machine: nodes, transitions and the three special nodes.
#[derive(Debug)]
pub struct PoseSubgraph {
    id: SubgraphId,
    nodes: Vec<Option<GraphNode>>,
    transitions: Vec<Transition>,
    entry: NodeId,
    exit: NodeId,
    any: NodeId,
}

impl Default for PoseSubgraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseSubgraph {
    pub fn new() -> Self {
        let id = SubgraphId::alloc();
        let mut graph = Self {
            id,
            nodes: Vec::new(),
            transitions: Vec::new(),
            entry: NodeId { owner: id, index: 0 },
            exit: NodeId { owner: id, index: 1 },
            any: NodeId { owner: id, index: 2 },
        };
        graph.entry = graph.push_node("Entry", NodeKind::Entry);
        graph.exit = graph.push_node("Exit", NodeKind::Exit);
        graph.any = graph.push_node("Any", NodeKind::Any);
        graph
    }

    pub fn id(&self) -> SubgraphId {
        self.id
    }

    pub fn entry_node(&self) -> NodeId {
        self.entry
    }

    pub fn exit_node(&self) -> NodeId {
        self.exit
    }

    pub fn any_node(&self) -> NodeId {
        self.any
    }

    /// Live nodes in slot order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> {
        let owner = self.id;
        self.nodes.iter().enumerate().filter_map(move |(i, n)| {
            n.as_ref().map(|n| {
                (
                    NodeId {
                        owner,
                        index: i as u32,
                    },
                    n,
                )
            })
        })
    }

    /// Number of slots, including holes left by removed nodes.
    pub(crate) fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        if id.owner != self.id {
            return None;
        }
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        if id.owner != self.id {
            return None;
        }
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// The pose node behind `id`, if it is one.
    pub fn pose_node_mut(&mut self, id: NodeId) -> Option<&mut PoseNode> {
        self.node_mut(id).and_then(GraphNode::as_pose_mut)
    }

    /// The nested subgraph behind `id`, if it is one.
    pub fn subgraph_mut(&mut self, id: NodeId) -> Option<&mut PoseSubgraph> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Subgraph(s) => Some(s),
            _ => None,
        }
    }

    /// First live node with `name`.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes()
            .find_map(|(id, n)| if n.name == name { Some(id) } else { None })
    }

    pub fn add_pose_node(&mut self, name: &str) -> NodeId {
        self.push_node(name, NodeKind::Pose(PoseNode::default()))
    }

    pub fn add_subgraph(&mut self, name: &str) -> NodeId {
        self.push_node(name, NodeKind::Subgraph(Box::new(PoseSubgraph::new())))
    }

    /// Remove a node and every transition touching it. Special nodes are kept.
    pub fn remove(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.assert_owned(node)?;
        if node == self.entry || node == self.exit || node == self.any {
            return Ok(());
        }
        self.erase_transitions_including(node)?;
        self.nodes[node.index()] = None;
        Ok(())
    }

    /// Connect two nodes, replacing an existing edge between the same ordered pair.
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        condition: Option<Condition>,
    ) -> Result<&mut Transition, GraphError> {
        self.assert_owned(from)?;
        self.assert_owned(to)?;

        if to == self.entry {
            return Err(GraphError::InvalidTransition(InvalidTransitionKind::ToEntry));
        }
        if to == self.any {
            return Err(GraphError::InvalidTransition(InvalidTransitionKind::ToAny));
        }
        if from == self.exit {
            return Err(GraphError::InvalidTransition(InvalidTransitionKind::FromExit));
        }

        self.disconnect(from, to)?;
        self.transitions.push(Transition {
            from,
            to,
            duration: DEFAULT_TRANSITION_DURATION,
            condition,
            exit_condition: None,
        });
        let last = self.transitions.len() - 1;
        Ok(&mut self.transitions[last])
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.assert_owned(from)?;
        self.assert_owned(to)?;
        self.transitions.retain(|t| !(t.from == from && t.to == to));
        Ok(())
    }

    pub fn transition(&self, from: NodeId, to: NodeId) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.from == from && t.to == to)
    }

    pub fn transition_mut(&mut self, from: NodeId, to: NodeId) -> Option<&mut Transition> {
        self.transitions
            .iter_mut()
            .find(|t| t.from == from && t.to == to)
    }

    /// All transitions in declaration order.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn outgoings(&self, from: NodeId) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.from == from)
    }

    pub fn incomings(&self, to: NodeId) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.to == to)
    }

    pub fn erase_outgoings(&mut self, from: NodeId) -> Result<(), GraphError> {
        self.assert_owned(from)?;
        self.transitions.retain(|t| t.from != from);
        Ok(())
    }

    pub fn erase_incomings(&mut self, to: NodeId) -> Result<(), GraphError> {
        self.assert_owned(to)?;
        self.transitions.retain(|t| t.to != to);
        Ok(())
    }

    pub fn erase_transitions_including(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.erase_incomings(node)?;
        self.erase_outgoings(node)
    }

    fn push_node(&mut self, name: &str, kind: NodeKind) -> NodeId {
        let id = NodeId {
            owner: self.id,
            index: self.nodes.len() as u32,
        };
        self.nodes.push(Some(GraphNode {
            name: name.to_string(),
            kind,
        }));
        id
    }

    fn assert_owned(&self, node: NodeId) -> Result<(), GraphError> {
        if node.owner != self.id || self.node(node).is_none() {
            return Err(GraphError::NotOwned {
                node: node.to_string(),
                subgraph: self.id.0,
            });
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerBlending {
    Override,
    #[default]
    Additive,
}

/// One weighted state machine composited into the blend buffer.
#[derive(Debug)]
pub struct Layer {
    pub name: String,
    graph: PoseSubgraph,
    pub weight: f32,
    pub mask: Option<SkeletonMask>,
    pub blending: LayerBlending,
}

impl Layer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            graph: PoseSubgraph::new(),
            weight: 1.0,
            mask: None,
            blending: LayerBlending::default(),
        }
    }

    pub fn graph(&self) -> &PoseSubgraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut PoseSubgraph {
        &mut self.graph
    }
}

/// The authored asset.
#[derive(Debug, Default)]
pub struct PoseGraph {
    layers: Vec<Layer>,
    variables: IndexMap<String, Variable>,
}

impl PoseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Append a layer; returns its index.
    pub fn add_layer(&mut self, name: &str) -> usize {
        self.push_layer(Layer::new(name))
    }

    pub fn push_layer(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Declare (or redeclare) a variable, optionally with an initial value.
    pub fn add_variable(
        &mut self,
        name: &str,
        kind: ValueKind,
        value: Option<Value>,
    ) -> Result<(), BindError> {
        let mut variable = Variable::new(kind);
        if let Some(value) = value {
            variable
                .set(value)
                .map_err(|expected| BindError::TypeMismatch {
                    variable: name.to_string(),
                    expected: expected.as_str(),
                    found: value.kind(),
                })?;
        }
        if self.variables.insert(name.to_string(), variable).is_some() {
            warn!("variable '{name}' redeclared");
        }
        Ok(())
    }
}
