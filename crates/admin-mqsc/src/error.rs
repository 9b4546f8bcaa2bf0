use std::process::ExitStatus;
use std::time::Duration;

use affinity_admin::mqsc::MqscFailure;
use affinity_admin::{AdminTransportError, FailureKind};
use thiserror::Error;

/// Result alias for the MQSC transport.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from running MQSC commands.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured program is not on the `PATH`.
    #[error("program {0} not found")]
    BinaryNotFound(String),

    /// An argument references `{{user}}` but no user was supplied.
    #[error("argument template needs a user but none was supplied")]
    MissingUser,

    /// The process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// The program.
        program: String,
        /// The cause.
        source: std::io::Error,
    },

    /// Talking to the process failed.
    #[error("i/o error talking to runmqsc: {0}")]
    Io(#[from] std::io::Error),

    /// The process did not finish in time and was killed.
    #[error("runmqsc did not finish within {0:?}")]
    Timeout(Duration),

    /// A failure message in the command output.
    #[error("{0}")]
    Mqsc(MqscFailure),

    /// The queue manager could not be reached (exit status 20).
    #[error("queue manager {0} not available")]
    QueueManagerUnavailable(String),

    /// The process exited unsuccessfully without a recognised message.
    #[error("runmqsc exited with {status}: {stderr}")]
    NonZeroExit {
        /// Exit status.
        status: ExitStatus,
        /// Captured standard error.
        stderr: String,
    },
}

impl AdminTransportError for Error {
    fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) | Self::QueueManagerUnavailable(_) => FailureKind::ConnectTimeout,
            Self::Mqsc(failure) => failure.kind,
            Self::BinaryNotFound(_)
            | Self::MissingUser
            | Self::Spawn { .. }
            | Self::Io(_)
            | Self::NonZeroExit { .. } => FailureKind::Other,
        }
    }
}
