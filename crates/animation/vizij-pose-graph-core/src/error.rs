//! Error families for authoring, binding, evaluation and document loading.

use thiserror::Error;

use crate::binding::BindingPoint;
use crate::value::ValueKind;

/// Why a transition cannot be created between two nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvalidTransitionKind {
    ToEntry,
    ToAny,
    FromExit,
}

impl std::fmt::Display for InvalidTransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvalidTransitionKind::ToEntry => "to-entry",
            InvalidTransitionKind::ToAny => "to-any",
            InvalidTransitionKind::FromExit => "from-exit",
        };
        f.write_str(s)
    }
}

/// Structural and authoring errors. These make an asset unusable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("invalid transition ({0})")]
    InvalidTransition(InvalidTransitionKind),
    #[error("node {node} is not owned by subgraph {subgraph}")]
    NotOwned { node: String, subgraph: u32 },
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("{point:?} is not a binding point of {host}")]
    UnknownBindingPoint { host: &'static str, point: BindingPoint },
    #[error("bad animation data: {0}")]
    BadMapping(String),
    #[error("{0} node is missing")]
    MissingSpecialNode(&'static str),
    #[error("invalid condition: {0}")]
    InvalidCondition(String),
}

/// Errors raised while resolving variable bindings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindError {
    #[error("variable '{0}' is not defined")]
    VariableNotDefined(String),
    #[error("variable '{variable}' is {found:?}, expected {expected}")]
    TypeMismatch {
        variable: String,
        expected: &'static str,
        found: ValueKind,
    },
}

/// Errors surfaced by the top-level evaluator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("layer {index} out of bounds (layer count {count})")]
    LayerOutOfRange { index: usize, count: usize },
}

/// Errors produced while loading a JSON pose graph document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("pose graph json parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown clip '{0}'")]
    UnknownClip(String),
    #[error("invalid clip: {0}")]
    InvalidClip(String),
    #[error("unknown node '{name}' in subgraph '{subgraph}'")]
    UnknownNode { subgraph: String, name: String },
    #[error("duplicate node '{name}' in subgraph '{subgraph}'")]
    DuplicateNode { subgraph: String, name: String },
    #[error("variable '{name}': {source}")]
    Variable {
        name: String,
        #[source]
        source: BindError,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
}
