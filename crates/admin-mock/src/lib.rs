//! In-memory admin transport for tests.
//!
//! `MemoryAdminTransport` scripts a small cluster: which nodes exist, which
//! connections each hosts, which query shapes each accepts, whether it answers at all,
//! and which users are refused. It also counts sessions so tests can check that none
//! leak.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use affinity_admin::{
    AdminSession, AdminTransport, ConnectionDescriptor, Credentials, InquireConnections,
    NodeAddress, QueryShape, attr,
};
use affinity_model::NodeId;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

pub use error::Error;

/// Attributes a `Minimal` inquiry returns.
const MINIMAL_ATTRIBUTES: &[&str] = &[
    attr::CONN,
    attr::APPLTAG,
    attr::CHANNEL,
    attr::CONNAME,
    attr::PID,
    attr::TID,
];

/// Build a descriptor the way a node would report a client connection.
#[must_use]
pub fn client_connection(id: &str, tag: &str, process_id: u32, thread_id: u32) -> ConnectionDescriptor {
    ConnectionDescriptor::new()
        .with(attr::CONN, id)
        .with(attr::APPLTAG, tag)
        .with(attr::CHANNEL, "APP.SVRCONN")
        .with(attr::CONNAME, "10.0.2.15")
        .with(attr::PID, process_id.to_string())
        .with(attr::TID, thread_id.to_string())
        .with(attr::USERID, "app")
        .with(attr::APPLTYPE, "USER")
}

#[derive(Default)]
struct MemoryNode {
    node_id: String,
    connections: Vec<ConnectionDescriptor>,
    unreachable: bool,
    rejected: HashSet<QueryShape>,
    transient_rejections: HashMap<QueryShape, usize>,
    latency: Duration,
}

#[derive(Default)]
struct ClusterState {
    nodes: HashMap<NodeAddress, MemoryNode>,
    denied_users: HashSet<String>,
    open_sessions: usize,
    sessions_opened: usize,
    inquiries: Vec<(NodeAddress, QueryShape)>,
}

/// A scripted in-memory cluster implementing `AdminTransport`.
#[derive(Clone, Default)]
pub struct MemoryAdminTransport {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryAdminTransport {
    /// An empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Its address and node id are both `name`.
    pub fn add_node(&self, name: &str) -> NodeAddress {
        let address = NodeAddress::new(name);
        self.state.lock().nodes.insert(
            address.clone(),
            MemoryNode {
                node_id: name.to_string(),
                ..MemoryNode::default()
            },
        );
        address
    }

    /// Add a connection to a node.
    pub fn add_connection(&self, node: &str, descriptor: ConnectionDescriptor) {
        self.with_node(node, |n| n.connections.push(descriptor));
    }

    /// Add `count` connections opened by one client thread under one tag, with
    /// sequential connection ids starting at `first_id`.
    pub fn add_group(&self, node: &str, tag: &str, process_id: u32, first_id: u64, count: usize) {
        for id in (first_id..).take(count) {
            self.add_connection(
                node,
                client_connection(&format!("{id:016X}"), tag, process_id, 1),
            );
        }
    }

    /// Remove every connection with the tag from `from` and add the first `keep` of them
    /// to `to`. The rest disappear.
    pub fn move_group(&self, from: &str, to: &str, tag: &str, keep: usize) {
        let mut moved = Vec::new();
        self.with_node(from, |n| {
            let (leaving, staying): (Vec<_>, Vec<_>) = n
                .connections
                .drain(..)
                .partition(|d| d.get(attr::APPLTAG) == Some(tag));
            n.connections = staying;
            moved = leaving;
        });

        moved.truncate(keep);
        self.with_node(to, |n| n.connections.extend(moved));
    }

    /// Remove every connection with the tag from a node.
    pub fn remove_group(&self, node: &str, tag: &str) {
        self.with_node(node, |n| {
            n.connections.retain(|d| d.get(attr::APPLTAG) != Some(tag));
        });
    }

    /// Make a node stop (or resume) answering.
    pub fn set_reachable(&self, node: &str, reachable: bool) {
        self.with_node(node, |n| n.unreachable = !reachable);
    }

    /// Make a node reject every inquiry of the shape.
    pub fn reject_shape(&self, node: &str, shape: QueryShape) {
        self.with_node(node, |n| {
            n.rejected.insert(shape);
        });
    }

    /// Make a node accept the shape again.
    pub fn accept_shape(&self, node: &str, shape: QueryShape) {
        self.with_node(node, |n| {
            n.rejected.remove(&shape);
        });
    }

    /// Make a node reject the next `times` inquiries of the shape.
    pub fn reject_shape_times(&self, node: &str, shape: QueryShape, times: usize) {
        self.with_node(node, |n| {
            n.transient_rejections.insert(shape, times);
        });
    }

    /// Delay every inquiry on a node.
    pub fn set_latency(&self, node: &str, latency: Duration) {
        self.with_node(node, |n| n.latency = latency);
    }

    /// Refuse sessions for the user.
    pub fn deny_user(&self, user: &str) {
        self.state.lock().denied_users.insert(user.to_string());
    }

    /// Sessions currently open.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.state.lock().open_sessions
    }

    /// Sessions opened since creation.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.state.lock().sessions_opened
    }

    /// Shapes issued against a node, oldest first.
    #[must_use]
    pub fn inquiries(&self, node: &str) -> Vec<QueryShape> {
        let address = NodeAddress::new(node);
        self.state
            .lock()
            .inquiries
            .iter()
            .filter(|(queried, _)| *queried == address)
            .map(|(_, shape)| *shape)
            .collect()
    }

    fn with_node(&self, node: &str, f: impl FnOnce(&mut MemoryNode)) {
        let mut state = self.state.lock();
        if let Some(node) = state.nodes.get_mut(&NodeAddress::new(node)) {
            f(node);
        }
    }
}

#[async_trait]
impl AdminTransport for MemoryAdminTransport {
    type Error = Error;
    type Session = MemorySession;

    async fn open_session(
        &self,
        node: &NodeAddress,
        credentials: &Credentials,
    ) -> Result<Self::Session, Self::Error> {
        let mut state = self.state.lock();

        if let Some(user) = credentials
            .user()
            .filter(|user| state.denied_users.contains(*user))
        {
            return Err(Error::NotAuthorized(user.to_string()));
        }

        let memory_node = state
            .nodes
            .get(node)
            .ok_or_else(|| Error::NodeNotFound(node.to_string()))?;

        if memory_node.unreachable {
            return Err(Error::Unreachable(node.to_string()));
        }

        let node_id = NodeId::new(memory_node.node_id.clone());

        state.open_sessions += 1;
        state.sessions_opened += 1;
        debug!(node = %node, "memory session opened");

        Ok(MemorySession {
            address: node.clone(),
            node_id,
            state: self.state.clone(),
        })
    }
}

/// A session on a `MemoryAdminTransport` node.
pub struct MemorySession {
    address: NodeAddress,
    node_id: NodeId,
    state: Arc<Mutex<ClusterState>>,
}

impl MemorySession {
    fn answer(&self, request: &InquireConnections) -> Result<(Duration, Vec<ConnectionDescriptor>), Error> {
        let mut state = self.state.lock();
        state.inquiries.push((self.address.clone(), request.shape));

        let node = state
            .nodes
            .get_mut(&self.address)
            .ok_or_else(|| Error::NodeNotFound(self.address.to_string()))?;

        if node.unreachable {
            return Err(Error::Unreachable(self.address.to_string()));
        }

        let rejected = Error::ShapeRejected {
            node: self.address.to_string(),
            shape: request.shape,
        };

        if let Some(remaining) = node
            .transient_rejections
            .get_mut(&request.shape)
            .filter(|remaining| **remaining > 0)
        {
            *remaining -= 1;
            return Err(rejected);
        }

        if node.rejected.contains(&request.shape) {
            return Err(rejected);
        }

        let descriptors = node
            .connections
            .iter()
            .filter(|d| {
                request
                    .filter
                    .as_ref()
                    .is_none_or(|filter| filter.matches(d.get(attr::APPLTAG)))
            })
            .map(|d| match request.shape {
                QueryShape::Full => d.clone(),
                QueryShape::Minimal => MINIMAL_ATTRIBUTES
                    .iter()
                    .filter_map(|name| d.get(name).map(|value| (*name, value)))
                    .collect(),
            })
            .collect();

        Ok((node.latency, descriptors))
    }
}

#[async_trait]
impl AdminSession for MemorySession {
    type Error = Error;

    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn inquire_connections(
        &self,
        request: &InquireConnections,
    ) -> Result<Vec<ConnectionDescriptor>, Self::Error> {
        let (latency, descriptors) = self.answer(request)?;

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        Ok(descriptors)
    }

    async fn close(self) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.open_sessions = state.open_sessions.checked_sub(1).ok_or(Error::SessionClosed)?;
        debug!(node = %self.address, "memory session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use affinity_admin::{AdminTransportError, FailureKind};
    use affinity_model::TagFilter;

    use super::*;

    #[tokio::test]
    async fn test_minimal_inquiry_projects_attributes() {
        let transport = MemoryAdminTransport::new();
        let qm1 = transport.add_node("QM1");
        transport.add_group("QM1", "PCF12345", 4242, 0x8A11_C068_0040_0040, 2);

        let session = transport.open_session(&qm1, &Credentials::anonymous()).await.unwrap();
        let descriptors = session
            .inquire_connections(&InquireConnections::new(QueryShape::Minimal, None))
            .await
            .unwrap();

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].get(attr::CONN), Some("8A11C06800400040"));
        assert_eq!(descriptors[0].get(attr::USERID), None);
        assert_eq!(descriptors[1].get(attr::CONN), Some("8A11C06800400041"));

        session.close().await.unwrap();
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_full_inquiry_filters_on_node() {
        let transport = MemoryAdminTransport::new();
        let qm1 = transport.add_node("QM1");
        transport.add_group("QM1", "APP-A", 1, 0x10, 3);
        transport.add_group("QM1", "APP-B", 2, 0x20, 2);

        let session = transport.open_session(&qm1, &Credentials::anonymous()).await.unwrap();
        let filter = TagFilter::Exact("APP-B".to_string());
        let descriptors = session
            .inquire_connections(&InquireConnections::new(QueryShape::Full, Some(&filter)))
            .await
            .unwrap();

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].get(attr::USERID), Some("app"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let transport = MemoryAdminTransport::new();
        let qm1 = transport.add_node("QM1");
        transport.deny_user("intruder");
        transport.reject_shape("QM1", QueryShape::Full);

        let denied = transport
            .open_session(&qm1, &Credentials::new("intruder", "x"))
            .await
            .err()
            .unwrap();
        assert_eq!(denied.kind(), FailureKind::AuthorizationDenied);

        let missing = transport
            .open_session(&NodeAddress::new("QM9"), &Credentials::anonymous())
            .await
            .err()
            .unwrap();
        assert_eq!(missing.kind(), FailureKind::ConnectTimeout);

        let session = transport.open_session(&qm1, &Credentials::anonymous()).await.unwrap();
        let rejected = session
            .inquire_connections(&InquireConnections::new(QueryShape::Full, None))
            .await
            .unwrap_err();
        assert_eq!(rejected.kind(), FailureKind::ProtocolError);
        session.close().await.unwrap();
    }

    #[test]
    fn test_move_group_keeps_subset() {
        let transport = MemoryAdminTransport::new();
        transport.add_node("QM1");
        transport.add_node("QM2");
        transport.add_group("QM1", "UC1", 4242, 1, 6);
        transport.add_group("QM1", "OTHER", 7, 100, 1);

        transport.move_group("QM1", "QM2", "UC1", 4);

        let state = transport.state.lock();
        assert_eq!(state.nodes[&NodeAddress::new("QM1")].connections.len(), 1);
        assert_eq!(state.nodes[&NodeAddress::new("QM2")].connections.len(), 4);
    }
}
