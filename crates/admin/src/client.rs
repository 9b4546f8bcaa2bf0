//! Connection queries with per-node query shape negotiation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use affinity_model::{ConnectionRecord, FailureKind, NodeId, NodeOutcome, NodeStatus, TagFilter};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::{
    AdminSession, AdminTransport, ConnectionDescriptor, Credentials, Error, InquireConnections,
    NodeAddress, QueryShape, Result, SessionGuard,
};

/// Default bound on opening a session
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single inquiry
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the admin query client
#[derive(Clone, Debug)]
pub struct AdminQueryConfig {
    /// Bound on opening a session
    pub connect_timeout: Duration,

    /// Bound on each inquiry
    pub query_timeout: Duration,
}

impl Default for AdminQueryConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// The merged result of querying several nodes at once.
#[derive(Clone, Debug)]
pub struct ClusterSnapshot {
    /// When the snapshot was started. Every record carries this timestamp.
    pub taken_at: DateTime<Utc>,

    /// One status per distinct address, in the order given.
    pub nodes: Vec<NodeStatus>,

    /// Records from every node that answered.
    pub records: Vec<ConnectionRecord>,
}

impl ClusterSnapshot {
    /// True if at least one node did not answer.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.nodes.iter().any(|status| !status.is_answered())
    }

    /// Addresses of nodes that did not answer.
    #[must_use]
    pub fn unreachable(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|status| !status.is_answered())
            .map(|status| status.address.clone())
            .collect()
    }
}

/// Queries connections on broker nodes through an `AdminTransport`.
///
/// Nodes differ in which query shapes they accept. The first query against a node
/// probes `Minimal`, then `Full`, and the accepted shape is remembered for later
/// queries against the same address.
pub struct AdminQueryClient<T>
where
    T: AdminTransport,
{
    transport: Arc<T>,
    config: AdminQueryConfig,
    capabilities: Arc<RwLock<HashMap<NodeAddress, QueryShape>>>,
}

impl<T> Clone for AdminQueryClient<T>
where
    T: AdminTransport,
{
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

impl<T> AdminQueryClient<T>
where
    T: AdminTransport,
{
    /// Create a client with default configuration
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_config(transport, AdminQueryConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(transport: Arc<T>, config: AdminQueryConfig) -> Self {
        Self {
            transport,
            config,
            capabilities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The shape negotiated for a node, if any query has succeeded against it.
    pub async fn negotiated_shape(&self, node: &NodeAddress) -> Option<QueryShape> {
        self.capabilities.read().await.get(node).copied()
    }

    /// Query the connections on one node.
    ///
    /// The filter is applied locally as well, so the result does not depend on the
    /// shape the node accepted.
    ///
    /// # Errors
    ///
    /// Returns `ConnectTimeout`, `AuthorizationDenied` or `ProtocolError` depending on
    /// how the node failed.
    pub async fn snapshot(
        &self,
        node: &NodeAddress,
        credentials: &Credentials,
        filter: Option<&TagFilter>,
    ) -> Result<Vec<ConnectionRecord>> {
        self.snapshot_at(node, credentials, filter, Utc::now())
            .await
            .map(|(_, records)| records)
    }

    /// Query several nodes concurrently under one shared deadline.
    ///
    /// Never fails as a whole: nodes that error or miss the deadline are reported as
    /// unreachable. Duplicate addresses are queried once.
    pub async fn snapshot_cluster(
        &self,
        nodes: &[NodeAddress],
        credentials: &Credentials,
        filter: Option<&TagFilter>,
        snapshot_timeout: Duration,
    ) -> ClusterSnapshot {
        let taken_at = Utc::now();
        let deadline = Instant::now() + snapshot_timeout;

        let mut seen = HashSet::new();
        let workers = nodes
            .iter()
            .filter(|node| seen.insert(*node))
            .map(|node| async move {
                let result = timeout_at(
                    deadline,
                    self.snapshot_at(node, credentials, filter, taken_at),
                )
                .await;
                (node, result)
            });

        let mut statuses = Vec::new();
        let mut records = Vec::new();

        for (node, result) in join_all(workers).await {
            let outcome = match result {
                Ok(Ok((node_id, node_records))) => {
                    let outcome = NodeOutcome::Answered {
                        node_id,
                        connections: node_records.len(),
                    };
                    records.extend(node_records);
                    outcome
                }
                Ok(Err(e)) => {
                    warn!(node = %node, "node unreachable: {e}");
                    NodeOutcome::Unreachable {
                        kind: e.kind(),
                        reason: e.to_string(),
                    }
                }
                Err(_) => {
                    warn!(node = %node, "node missed the snapshot deadline of {snapshot_timeout:?}");
                    NodeOutcome::Unreachable {
                        kind: FailureKind::ConnectTimeout,
                        reason: format!("no answer within {snapshot_timeout:?}"),
                    }
                }
            };

            statuses.push(NodeStatus {
                address: node.to_string(),
                outcome,
            });
        }

        ClusterSnapshot {
            taken_at,
            nodes: statuses,
            records,
        }
    }

    async fn snapshot_at(
        &self,
        node: &NodeAddress,
        credentials: &Credentials,
        filter: Option<&TagFilter>,
        observed_at: DateTime<Utc>,
    ) -> Result<(NodeId, Vec<ConnectionRecord>)> {
        let session = timeout(
            self.config.connect_timeout,
            self.transport.open_session(node, credentials),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            node: node.clone(),
            reason: format!("no session within {:?}", self.config.connect_timeout),
        })?
        .map_err(|e| Error::from_transport(node, None, &e))?;

        let guard = SessionGuard::new(session);
        let node_id = guard.session().node_id().clone();

        let result = self.inquire(node, guard.session(), filter).await;

        if let Err(e) = guard.close().await {
            warn!(node = %node, "failed to close admin session: {e}");
        }

        let records: Vec<ConnectionRecord> = result?
            .into_iter()
            .filter_map(|descriptor| descriptor.into_record(&node_id, observed_at))
            .filter(|record| filter.is_none_or(|filter| filter.matches(record.correlation_tag.as_deref())))
            .collect();

        debug!(node = %node, node_id = %node_id, "{} connections after filtering", records.len());

        Ok((node_id, records))
    }

    async fn inquire(
        &self,
        node: &NodeAddress,
        session: &T::Session,
        filter: Option<&TagFilter>,
    ) -> Result<Vec<ConnectionDescriptor>> {
        if let Some(shape) = self.negotiated_shape(node).await {
            match self.inquire_shape(node, session, shape, filter).await {
                Err(Error::ProtocolError { reason, .. }) => {
                    warn!(node = %node, "cached {shape} shape rejected, renegotiating: {reason}");
                    self.capabilities.write().await.remove(node);
                }
                other => return other,
            }
        }

        self.negotiate(node, session, filter).await
    }

    async fn negotiate(
        &self,
        node: &NodeAddress,
        session: &T::Session,
        filter: Option<&TagFilter>,
    ) -> Result<Vec<ConnectionDescriptor>> {
        let minimal = match self.inquire_shape(node, session, QueryShape::Minimal, filter).await {
            Err(Error::ProtocolError { reason, .. }) => {
                debug!(node = %node, "minimal inquiry rejected, retrying once: {reason}");
                self.inquire_shape(node, session, QueryShape::Minimal, filter)
                    .await?
            }
            other => other?,
        };

        let accepted = match self.inquire_shape(node, session, QueryShape::Full, filter).await {
            Ok(full) => {
                self.remember(node, QueryShape::Full).await;
                full
            }
            Err(Error::ProtocolError { reason, .. }) => {
                info!(node = %node, "full inquiry not supported, using minimal: {reason}");
                self.remember(node, QueryShape::Minimal).await;
                minimal
            }
            Err(e) => return Err(e),
        };

        Ok(accepted)
    }

    async fn inquire_shape(
        &self,
        node: &NodeAddress,
        session: &T::Session,
        shape: QueryShape,
        filter: Option<&TagFilter>,
    ) -> Result<Vec<ConnectionDescriptor>> {
        let request = InquireConnections::new(shape, filter);

        timeout(self.config.query_timeout, session.inquire_connections(&request))
            .await
            .map_err(|_| Error::ConnectTimeout {
                node: node.clone(),
                reason: format!("{shape} inquiry took longer than {:?}", self.config.query_timeout),
            })?
            .map_err(|e| Error::from_transport(node, Some(shape), &e))
    }

    async fn remember(&self, node: &NodeAddress, shape: QueryShape) {
        let previous = self.capabilities.write().await.insert(node.clone(), shape);
        if previous != Some(shape) {
            debug!(node = %node, "negotiated {shape} query shape");
        }
    }
}
