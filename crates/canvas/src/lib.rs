use thiserror::Error;

mod model;
pub use model::*;
mod operations;
pub use operations::*;
mod reducer;
pub use reducer::*;
mod commands;
pub use commands::*;
mod history;
pub use history::*;
mod schema;
pub use schema::*;

#[derive(Debug, Error, PartialEq)]
pub enum CanvasError {
    #[error("node {node} ({kind}) is missing required prop `{prop}`")]
    MissingProp {
        node: NodeId,
        kind: NodeType,
        prop: String,
    },
    #[error("node {node} prop `{prop}` should be {expected}")]
    InvalidProp {
        node: NodeId,
        prop: String,
        expected: PropKind,
    },
}

pub type Result<T> = std::result::Result<T, CanvasError>;
