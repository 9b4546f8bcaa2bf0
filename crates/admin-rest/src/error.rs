use affinity_admin::mqsc::MqscFailure;
use affinity_admin::{AdminTransportError, FailureKind};
use http::StatusCode;
use thiserror::Error;

/// Result alias for the REST transport.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the MQ administrative REST API.
#[derive(Debug, Error)]
pub enum Error {
    /// The node address is not `scheme://host:port/QMGR`.
    #[error("invalid node address {0}: expected https://host:port/QMGR")]
    InvalidAddress(String),

    /// The HTTP request failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("unexpected response body: {0}")]
    Json(#[from] serde_json::Error),

    /// The server refused the credentials or session.
    #[error("request refused with {0}")]
    Unauthorized(StatusCode),

    /// The command completed with the not-authorized reason code.
    #[error("command not authorized (reason {0})")]
    NotAuthorized(i64),

    /// The queue manager is unknown or not running.
    #[error("queue manager {0} not available")]
    QueueManagerUnavailable(String),

    /// The server rejected the command.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// A failure message inside the command output.
    #[error("{0}")]
    Mqsc(MqscFailure),

    /// Any other unexpected status.
    #[error("unexpected status {0}")]
    Status(StatusCode),
}

impl AdminTransportError for Error {
    fn kind(&self) -> FailureKind {
        match self {
            Self::Http(e) if e.is_connect() || e.is_timeout() => FailureKind::ConnectTimeout,
            Self::QueueManagerUnavailable(_) => FailureKind::ConnectTimeout,
            Self::Unauthorized(_) | Self::NotAuthorized(_) => FailureKind::AuthorizationDenied,
            Self::Rejected(_) => FailureKind::ProtocolError,
            Self::Mqsc(failure) => failure.kind,
            Self::InvalidAddress(_) | Self::Http(_) | Self::Json(_) | Self::Status(_) => {
                FailureKind::Other
            }
        }
    }
}
