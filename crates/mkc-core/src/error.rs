use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by config loading, node resolution, and the cluster model.
///
/// Every variant carries the identifier it applies to - callers never see a
/// bare "failed" without a subject.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration source file is missing or malformed. Fatal.
    #[error("failed to load config file {}: {reason}", path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    /// One node's layered config did not resolve. Collected per node, never
    /// aborts resolution of the rest of the cluster.
    #[error("failed to resolve node '{node}': {reason}")]
    Resolution { node: String, reason: String },

    /// A quantity string had an unrecognized suffix or non-numeric magnitude.
    #[error("invalid quantity {text:?}: {reason}")]
    InvalidQuantity { text: String, reason: String },

    /// A node with this name already exists in the cluster.
    #[error("duplicate node '{0}' in cluster")]
    DuplicateNode(String),

    /// A mutating operation named a node the cluster does not contain.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// A backend call failed at the transport level (could not run, or the
    /// response was unintelligible).
    #[error("backend {operation} failed: {message}")]
    Gateway { operation: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
