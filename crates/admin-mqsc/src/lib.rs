//! Admin transport that drives `runmqsc`.
//!
//! Each inquiry runs the configured program once, writes the MQSC command to its
//! standard input and parses what it prints. The program and its arguments are
//! templates so the same transport covers a local install (`runmqsc QM1`) and a broker
//! in a container (`docker exec -i qm1 runmqsc QM1`).
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use affinity_admin::mqsc::{parse_response, render_inquiry};
use affinity_admin::{
    AdminSession, AdminTransport, ConnectionDescriptor, Credentials, InquireConnections,
    NodeAddress,
};
use affinity_model::NodeId;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Exit status `runmqsc` uses when the queue manager is not available.
const EXIT_QMGR_UNAVAILABLE: i32 = 20;

/// Exit status `runmqsc` uses when some command failed.
const EXIT_COMMAND_FAILED: i32 = 10;

/// Default bound on one `runmqsc` run
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// How to invoke `runmqsc`.
///
/// Arguments may contain `{node}` (the node address as given), `{node_lower}` (the
/// same in lower case) and `{user}` (the session user; the password is then written to
/// standard input ahead of the command, as `runmqsc -u` expects).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqscOptions {
    /// Program to run.
    pub program: String,

    /// Argument templates.
    pub args: Vec<String>,

    /// Bound on one run.
    pub timeout: Duration,
}

impl Default for MqscOptions {
    fn default() -> Self {
        Self {
            program: "runmqsc".to_string(),
            args: vec!["{node}".to_string()],
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl MqscOptions {
    /// Run `runmqsc` inside a container named after the node in lower case.
    #[must_use]
    pub fn docker() -> Self {
        Self {
            program: "docker".to_string(),
            args: ["exec", "-i", "{node_lower}", "runmqsc", "{node}"]
                .map(String::from)
                .to_vec(),
            ..Self::default()
        }
    }
}

/// Admin transport that shells out to `runmqsc`.
#[derive(Clone, Debug)]
pub struct MqscAdminTransport {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl MqscAdminTransport {
    /// Creates a new `MqscAdminTransport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be found.
    pub fn new(options: MqscOptions) -> Result<Self> {
        let program = which::which(&options.program)
            .map_err(|_| Error::BinaryNotFound(options.program.clone()))?;

        Ok(Self {
            program,
            args: options.args,
            timeout: options.timeout,
        })
    }
}

fn expand(template: &str, node: &NodeAddress, user: Option<&str>) -> Result<String> {
    let mut arg = template
        .replace("{node_lower}", &node.as_str().to_lowercase())
        .replace("{node}", node.as_str());

    if arg.contains("{user}") {
        arg = arg.replace("{user}", user.ok_or(Error::MissingUser)?);
    }

    Ok(arg)
}

#[async_trait]
impl AdminTransport for MqscAdminTransport {
    type Error = Error;
    type Session = MqscSession;

    async fn open_session(
        &self,
        node: &NodeAddress,
        credentials: &Credentials,
    ) -> Result<Self::Session> {
        let args = self
            .args
            .iter()
            .map(|template| expand(template, node, credentials.user()))
            .collect::<Result<Vec<_>>>()?;

        let uses_user = self.args.iter().any(|template| template.contains("{user}"));

        Ok(MqscSession {
            node_id: NodeId::new(node.as_str()),
            program: self.program.clone(),
            args,
            password: credentials
                .password()
                .filter(|_| uses_user)
                .map(ToString::to_string),
            timeout: self.timeout,
        })
    }
}

/// A logical session: the command line to run for one node.
pub struct MqscSession {
    node_id: NodeId,
    program: PathBuf,
    args: Vec<String>,
    password: Option<String>,
    timeout: Duration,
}

impl MqscSession {
    async fn run(&self, command: &str) -> Result<Vec<ConnectionDescriptor>> {
        debug!(node = %self.node_id, "running {command} via {}", self.program.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let mut input = String::new();
        if let Some(password) = &self.password {
            input.push_str(password);
            input.push('\n');
        }
        input.push_str(command);
        input.push('\n');

        let mut closed_early = None;
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(input.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(node = %self.node_id, "runmqsc exited before reading its input");
                    closed_early = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(node = %self.node_id, "runmqsc output:\n{stdout}");

        let failure = || match output.status.code() {
            Some(EXIT_QMGR_UNAVAILABLE) => Error::QueueManagerUnavailable(self.node_id.to_string()),
            _ => Error::NonZeroExit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
        };

        // runmqsc never saw the command: classify by exit status.
        if let Some(source) = closed_early {
            return Err(if output.status.success() {
                Error::Io(source)
            } else {
                failure()
            });
        }

        let descriptors = parse_response(&stdout).map_err(Error::Mqsc)?;

        match output.status.code() {
            Some(0 | EXIT_COMMAND_FAILED) => Ok(descriptors),
            _ => Err(failure()),
        }
    }
}

#[async_trait]
impl AdminSession for MqscSession {
    type Error = Error;

    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn inquire_connections(
        &self,
        request: &InquireConnections,
    ) -> Result<Vec<ConnectionDescriptor>> {
        self.run(&render_inquiry(request)).await
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_expand_placeholders() {
        let node = NodeAddress::new("QM1");
        assert_eq!(expand("{node_lower}", &node, None).unwrap(), "qm1");
        assert_eq!(expand("{node}", &node, None).unwrap(), "QM1");
        assert_eq!(expand("{user}", &node, Some("mqadmin")).unwrap(), "mqadmin");
        assert_matches!(expand("-u {user}", &node, None), Err(Error::MissingUser));
    }

    #[test]
    fn test_docker_options() {
        let options = MqscOptions::docker();
        let node = NodeAddress::new("QM2");
        let args: Vec<String> = options
            .args
            .iter()
            .map(|arg| expand(arg, &node, None).unwrap())
            .collect();

        assert_eq!(args, ["exec", "-i", "qm2", "runmqsc", "QM2"]);
    }

    #[test]
    fn test_missing_program() {
        let options = MqscOptions {
            program: "definitely-not-runmqsc-7f3a".to_string(),
            ..MqscOptions::default()
        };
        assert_matches!(MqscAdminTransport::new(options), Err(Error::BinaryNotFound(_)));
    }
}
