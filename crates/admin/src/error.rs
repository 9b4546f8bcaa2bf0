//! Error types for administrative queries

use std::error::Error as StdError;
use std::fmt::Debug;

use affinity_model::FailureKind;
use thiserror::Error;

use crate::{NodeAddress, QueryShape};

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Marker trait for `AdminTransport` errors
pub trait AdminTransportError: Debug + StdError + Send + Sync + 'static {
    /// Returns the failure class of this error
    fn kind(&self) -> FailureKind;
}

/// Errors surfaced by `AdminQueryClient`.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The node did not answer in time or could not be reached.
    #[error("connecting to {node} timed out: {reason}")]
    ConnectTimeout {
        /// The node.
        node: NodeAddress,
        /// What the transport reported.
        reason: String,
    },

    /// The credentials lack query rights on the node.
    #[error("not authorized to inquire connections on {node}: {reason}")]
    AuthorizationDenied {
        /// The node.
        node: NodeAddress,
        /// What the transport reported.
        reason: String,
    },

    /// The node rejected the query shape.
    #[error("{node} rejected the {shape} connection inquiry: {reason}")]
    ProtocolError {
        /// The node.
        node: NodeAddress,
        /// The shape that was rejected.
        shape: QueryShape,
        /// What the transport reported.
        reason: String,
    },

    /// Any other transport failure.
    #[error("admin transport error on {node}: {reason}")]
    Transport {
        /// The node.
        node: NodeAddress,
        /// What the transport reported.
        reason: String,
    },
}

impl Error {
    /// Returns the failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::ConnectTimeout { .. } => FailureKind::ConnectTimeout,
            Self::AuthorizationDenied { .. } => FailureKind::AuthorizationDenied,
            Self::ProtocolError { .. } => FailureKind::ProtocolError,
            Self::Transport { .. } => FailureKind::Other,
        }
    }

    /// The node the error concerns.
    #[must_use]
    pub const fn node(&self) -> &NodeAddress {
        match self {
            Self::ConnectTimeout { node, .. }
            | Self::AuthorizationDenied { node, .. }
            | Self::ProtocolError { node, .. }
            | Self::Transport { node, .. } => node,
        }
    }

    /// Classify a transport error. Protocol errors outside an inquiry are plain
    /// transport errors since there is no query shape to blame.
    pub(crate) fn from_transport<E>(node: &NodeAddress, shape: Option<QueryShape>, error: &E) -> Self
    where
        E: AdminTransportError,
    {
        let node = node.clone();
        let reason = error.to_string();

        match (error.kind(), shape) {
            (FailureKind::ConnectTimeout, _) => Self::ConnectTimeout { node, reason },
            (FailureKind::AuthorizationDenied, _) => Self::AuthorizationDenied { node, reason },
            (FailureKind::ProtocolError, Some(shape)) => Self::ProtocolError {
                node,
                shape,
                reason,
            },
            (FailureKind::ProtocolError | FailureKind::Other, _) => Self::Transport { node, reason },
        }
    }
}
