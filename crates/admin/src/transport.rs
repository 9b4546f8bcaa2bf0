//! The transport seam between the query client and a broker's admin interface.

use std::fmt;
use std::str::FromStr;

use affinity_model::NodeId;
use async_trait::async_trait;

use crate::{AdminTransportError, ConnectionDescriptor, InquireConnections};

/// Address of one broker node as understood by a transport.
///
/// The REST transport expects `https://host:port/QMGR`, the MQSC transport a queue
/// manager name, the memory transport a node name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Create an address. Surrounding whitespace is removed.
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_string())
    }

    /// The address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = Self::new(s);
        if address.0.is_empty() {
            return Err("node address must not be empty".to_string());
        }
        Ok(address)
    }
}

/// Credentials for an administrative session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    user: Option<String>,
    password: Option<String>,
}

impl Credentials {
    /// Credentials with a user and password.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }

    /// No credentials; the node decides what an anonymous session may do.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user: None,
            password: None,
        }
    }

    /// Build from optional parts.
    #[must_use]
    pub const fn from_parts(user: Option<String>, password: Option<String>) -> Self {
        Self { user, password }
    }

    /// The user name.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// The password.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

/// An open administrative session on one node.
///
/// Sessions are closed through `SessionGuard`, never left to the transport.
#[async_trait]
pub trait AdminSession: Send + Sync + 'static {
    /// The error type of the transport.
    type Error: AdminTransportError;

    /// Identity the node reported when the session was opened.
    fn node_id(&self) -> &NodeId;

    /// Issue one connection inquiry.
    ///
    /// A node that does not accept the request's shape must fail with an error of kind
    /// `ProtocolError`.
    async fn inquire_connections(
        &self,
        request: &InquireConnections,
    ) -> Result<Vec<ConnectionDescriptor>, Self::Error>;

    /// Release the session.
    async fn close(self) -> Result<(), Self::Error>;
}

/// Opens administrative sessions to broker nodes.
#[async_trait]
pub trait AdminTransport: Send + Sync + 'static {
    /// The error type of the transport.
    type Error: AdminTransportError;

    /// The session type.
    type Session: AdminSession<Error = Self::Error>;

    /// Open a session to a node.
    async fn open_session(
        &self,
        node: &NodeAddress,
        credentials: &Credentials,
    ) -> Result<Self::Session, Self::Error>;
}
