//! Monitor configuration, loadable from TOML.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use affinity_admin::{AdminQueryConfig, NodeAddress};
use affinity_model::TagFilter;
use serde::{Deserialize, Serialize};

use crate::serde_duration;
use crate::{Error, Result};

/// How the monitor reaches the nodes' administrative interface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Administrative REST API; node addresses are queue manager URLs.
    #[default]
    Rest,

    /// Local `runmqsc`; node addresses are queue manager names.
    Mqsc,

    /// `runmqsc` inside a container named after the queue manager.
    Docker,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rest => "rest",
            Self::Mqsc => "mqsc",
            Self::Docker => "docker",
        })
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "mqsc" => Ok(Self::Mqsc),
            "docker" => Ok(Self::Docker),
            other => Err(format!("unknown transport {other:?}, expected rest, mqsc or docker")),
        }
    }
}

/// Transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Which transport to use.
    pub kind: TransportKind,

    /// REST: accept self-signed server certificates.
    pub accept_invalid_certs: bool,

    /// REST: bound on each HTTP request.
    #[serde(with = "serde_duration")]
    pub request_timeout: Duration,

    /// MQSC: program to run instead of the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// MQSC: arguments for `program`; `{node}`, `{node_lower}` and `{user}` are expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// MQSC: bound on one command run.
    #[serde(with = "serde_duration")]
    pub command_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Rest,
            accept_invalid_certs: false,
            request_timeout: Duration::from_secs(10),
            program: None,
            args: None,
            command_timeout: Duration::from_secs(15),
        }
    }
}

/// Monitor configuration.
///
/// Every field has a default, so a file only needs the values it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between polls in watch mode.
    #[serde(with = "serde_duration")]
    pub interval: Duration,

    /// How long a reconnecting group may take to settle.
    #[serde(with = "serde_duration")]
    pub dwell: Duration,

    /// Deadline shared by all node queries of one snapshot.
    #[serde(with = "serde_duration")]
    pub snapshot_timeout: Duration,

    /// Bound on opening one administrative session.
    #[serde(with = "serde_duration")]
    pub connect_timeout: Duration,

    /// Bound on one inquiry.
    #[serde(with = "serde_duration")]
    pub query_timeout: Duration,

    /// Node addresses to query.
    pub nodes: Vec<String>,

    /// Only report connections whose tag starts with this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_filter: Option<String>,

    /// Match `tag_filter` exactly instead of as a prefix.
    pub exact_tag: bool,

    /// Administrative user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Transport settings.
    pub transport: TransportConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            dwell: Duration::from_secs(60),
            snapshot_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(10),
            nodes: Vec::new(),
            tag_filter: None,
            exact_tag: false,
            user: None,
            transport: TransportConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(toml::from_str(&contents)?)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialised or written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("interval", self.interval),
            ("dwell", self.dwell),
            ("snapshot_timeout", self.snapshot_timeout),
            ("connect_timeout", self.connect_timeout),
            ("query_timeout", self.query_timeout),
            ("transport.request_timeout", self.transport.request_timeout),
            ("transport.command_timeout", self.transport.command_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Invalid(format!("{name} must be greater than zero")));
            }
        }

        if self.nodes.is_empty() {
            return Err(Error::Invalid("at least one node is required".to_string()));
        }

        self.node_addresses()?;

        if self
            .tag_filter
            .as_deref()
            .is_some_and(|tag| tag.trim().is_empty())
        {
            return Err(Error::Invalid("tag filter must not be blank".to_string()));
        }

        if self.transport.kind == TransportKind::Rest
            && (self.transport.program.is_some() || self.transport.args.is_some())
        {
            return Err(Error::Invalid(
                "transport.program and transport.args only apply to mqsc and docker".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured nodes as addresses.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` for a blank address.
    pub fn node_addresses(&self) -> Result<Vec<NodeAddress>> {
        self.nodes
            .iter()
            .map(|node| {
                node.parse::<NodeAddress>()
                    .map_err(|e| Error::Invalid(format!("node {node:?}: {e}")))
            })
            .collect()
    }

    /// The tag filter, if one is configured.
    #[must_use]
    pub fn filter(&self) -> Option<TagFilter> {
        let tag = self
            .tag_filter
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())?;
        Some(if self.exact_tag {
            TagFilter::Exact(tag.to_string())
        } else {
            TagFilter::Prefix(tag.to_string())
        })
    }

    /// Timeouts for the admin query client.
    #[must_use]
    pub const fn query_config(&self) -> AdminQueryConfig {
        AdminQueryConfig {
            connect_timeout: self.connect_timeout,
            query_timeout: self.query_timeout,
        }
    }
}
