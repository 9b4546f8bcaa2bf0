use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use affinity_admin::{AdminQueryClient, AdminTransport, Credentials, NodeAddress};
use affinity_correlation::SnapshotReport;
use affinity_model::TagFilter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{GroupTracker, MonitorConfig, MonitorEvent, Result};

/// What a watch run saw overall.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Snapshots taken.
    pub polls: usize,

    /// Addresses that did not answer a single poll.
    pub never_answered: Vec<String>,
}

impl WatchSummary {
    /// True if every node answered at least once.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.never_answered.is_empty()
    }
}

/// Polls a set of nodes and follows their connection groups.
pub struct Monitor<T>
where
    T: AdminTransport,
{
    client: AdminQueryClient<T>,
    nodes: Vec<NodeAddress>,
    credentials: Credentials,
    filter: Option<TagFilter>,
    interval: Duration,
    dwell: Duration,
    snapshot_timeout: Duration,
}

impl<T> Monitor<T>
where
    T: AdminTransport,
{
    /// Create a monitor for the nodes and timings in `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if the configuration does not validate.
    pub fn new(transport: Arc<T>, config: &MonitorConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            client: AdminQueryClient::with_config(transport, config.query_config()),
            nodes: config.node_addresses()?,
            credentials,
            filter: config.filter(),
            interval: config.interval,
            dwell: config.dwell,
            snapshot_timeout: config.snapshot_timeout,
        })
    }

    /// The query client, with its negotiated shapes.
    pub const fn client(&self) -> &AdminQueryClient<T> {
        &self.client
    }

    /// Query every node once and analyse the result.
    pub async fn snapshot(&self) -> SnapshotReport {
        let snapshot = self
            .client
            .snapshot_cluster(
                &self.nodes,
                &self.credentials,
                self.filter.as_ref(),
                self.snapshot_timeout,
            )
            .await;

        SnapshotReport::build(snapshot.taken_at, snapshot.nodes, snapshot.records)
    }

    /// Poll until cancelled, sending what happens to `events`.
    ///
    /// Cancellation is checked before each poll and interrupts the pause between polls,
    /// never a poll in progress. The run also ends if the receiver goes away.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        events: mpsc::Sender<MonitorEvent>,
    ) -> WatchSummary {
        let mut tracker = GroupTracker::new(self.dwell);
        let mut answered = HashSet::new();
        let mut polls = 0;

        info!(
            "watching {} nodes every {}",
            self.nodes.len(),
            humantime::format_duration(self.interval)
        );

        'watch: while !cancel.is_cancelled() {
            let report = self.snapshot().await;
            polls += 1;

            answered.extend(
                report
                    .nodes
                    .iter()
                    .filter(|status| status.is_answered())
                    .map(|status| status.address.clone()),
            );

            let mut batch: Vec<MonitorEvent> = report
                .anomalies
                .iter()
                .cloned()
                .map(MonitorEvent::Anomaly)
                .collect();
            batch.extend(tracker.observe(&report));
            batch.insert(0, MonitorEvent::Snapshot(Box::new(report)));

            for event in batch {
                if events.send(event).await.is_err() {
                    debug!("event receiver dropped, stopping");
                    break 'watch;
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break 'watch,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        let never_answered: Vec<String> = if polls == 0 {
            Vec::new()
        } else {
            self.nodes
                .iter()
                .map(ToString::to_string)
                .filter(|address| !answered.contains(address))
                .collect()
        };

        if !never_answered.is_empty() {
            warn!("never answered: {}", never_answered.join(","));
        }
        info!("watch stopped after {polls} polls");

        WatchSummary {
            polls,
            never_answered,
        }
    }
}
