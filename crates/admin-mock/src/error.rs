//! Error types for the in-memory admin transport.

use affinity_admin::{AdminTransportError, FailureKind, QueryShape};
use thiserror::Error;

/// Error type for the in-memory admin transport.
#[derive(Debug, Error)]
pub enum Error {
    /// No node is registered under the address.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The node is scripted as down.
    #[error("node {0} is unreachable")]
    Unreachable(String),

    /// The user is scripted as lacking query rights.
    #[error("user {0} is not authorized")]
    NotAuthorized(String),

    /// The node is scripted to reject the shape.
    #[error("node {node} rejects {shape} inquiries")]
    ShapeRejected {
        /// The node.
        node: String,
        /// The rejected shape.
        shape: QueryShape,
    },

    /// The session was already closed.
    #[error("session already closed")]
    SessionClosed,
}

impl AdminTransportError for Error {
    fn kind(&self) -> FailureKind {
        match self {
            Self::NodeNotFound(_) | Self::Unreachable(_) => FailureKind::ConnectTimeout,
            Self::NotAuthorized(_) => FailureKind::AuthorizationDenied,
            Self::ShapeRejected { .. } => FailureKind::ProtocolError,
            Self::SessionClosed => FailureKind::Other,
        }
    }
}
