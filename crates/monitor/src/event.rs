use std::fmt;

use affinity_correlation::SnapshotReport;
use affinity_model::{Anomaly, GroupKey, MovementRecord, NodeId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Where a tracked group stands in the failover cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorState {
    /// Consistent on one node.
    Stable,

    /// Missing, split, or its node stopped answering.
    Reconnecting,

    /// Did not settle within the dwell bound.
    FailoverTimeout,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "STABLE",
            Self::Reconnecting => "RECONNECTING",
            Self::FailoverTimeout => "FAILOVER_TIMEOUT",
        })
    }
}

/// Something the watch loop reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A poll finished.
    Snapshot(Box<SnapshotReport>),

    /// A group was seen for the first time.
    GroupDiscovered {
        /// The group.
        tag: GroupKey,

        /// Node hosting it.
        node: NodeId,

        /// Members, parent included.
        size: usize,

        /// Snapshot time.
        at: DateTime<Utc>,
    },

    /// A stable group disappeared while its node kept answering.
    GroupClosed {
        /// The group.
        tag: GroupKey,

        /// Node that hosted it.
        node: NodeId,

        /// Snapshot time.
        at: DateTime<Utc>,
    },

    /// A group changed state.
    Transition {
        /// The group.
        tag: GroupKey,

        /// Previous state.
        from: MonitorState,

        /// New state.
        to: MonitorState,

        /// Snapshot time.
        at: DateTime<Utc>,
    },

    /// A group was compared against its baseline.
    Movement(MovementRecord),

    /// An anomaly from a snapshot or from the state machine.
    Anomaly(Anomaly),
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn outcome(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot(report) => {
                let answered = report.nodes.iter().filter(|s| s.is_answered()).count();
                write!(
                    f,
                    "{} snapshot: {} groups, {} untagged, {answered}/{} nodes answered",
                    timestamp(&report.taken_at),
                    report.groups.len(),
                    report.untagged,
                    report.nodes.len()
                )
            }
            Self::GroupDiscovered { tag, node, size, at } => {
                write!(f, "{} group {tag} tracked on {node} ({size} connections)", timestamp(at))
            }
            Self::GroupClosed { tag, node, at } => {
                write!(f, "{} group {tag} closed on {node}", timestamp(at))
            }
            Self::Transition { tag, from, to, at } => {
                write!(f, "{} group {tag} {from} -> {to}", timestamp(at))
            }
            Self::Movement(movement) => {
                let after = movement
                    .after_node
                    .as_ref()
                    .map_or("?", NodeId::as_str);
                let size_after = movement
                    .group_size_after
                    .map_or_else(|| "?".to_string(), |size| size.to_string());
                write!(
                    f,
                    "{} group {} {} -> {} size {} -> {size_after} moved={} intact={}",
                    timestamp(&movement.observed_at),
                    movement.tag,
                    movement.before_node,
                    after,
                    movement.group_size_before,
                    outcome(movement.moved),
                    outcome(movement.intact)
                )?;
                match movement.members_lost() {
                    0 => Ok(()),
                    lost => write!(f, " lost={lost}"),
                }
            }
            Self::Anomaly(anomaly) => write!(f, "anomaly: {anomaly}"),
        }
    }
}
