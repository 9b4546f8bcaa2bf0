use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GroupKey, NodeId};

/// Why a node could not be queried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The node did not answer within the timeout.
    ConnectTimeout,

    /// The credentials lack query rights.
    AuthorizationDenied,

    /// The node rejected the query shape.
    ProtocolError,

    /// Any other transport failure.
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// What one node contributed to a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// The node answered.
    Answered {
        /// Identity the node reported.
        node_id: NodeId,

        /// Connections it returned after filtering.
        connections: usize,
    },

    /// The node could not be queried; its contribution is unknown.
    Unreachable {
        /// Failure class.
        kind: FailureKind,

        /// Human readable reason.
        reason: String,
    },
}

/// Outcome of querying one address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// The address that was queried.
    pub address: String,

    /// What happened.
    #[serde(flatten)]
    pub outcome: NodeOutcome,
}

impl NodeStatus {
    /// True if the node answered.
    #[must_use]
    pub const fn is_answered(&self) -> bool {
        matches!(self.outcome, NodeOutcome::Answered { .. })
    }

    /// The node identity if it answered.
    #[must_use]
    pub const fn node_id(&self) -> Option<&NodeId> {
        match &self.outcome {
            NodeOutcome::Answered { node_id, .. } => Some(node_id),
            NodeOutcome::Unreachable { .. } => None,
        }
    }
}

/// A condition the caller must see.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "anomaly", rename_all = "snake_case")]
pub enum Anomaly {
    /// One tag observed on more than one node in the same snapshot.
    SplitGroupDetected {
        /// The split group.
        tag: GroupKey,

        /// Every node hosting part of it.
        nodes: Vec<NodeId>,
    },

    /// Some nodes did not answer.
    PartialSnapshot {
        /// Addresses that did not answer.
        unreachable: Vec<String>,
    },

    /// A group stayed in reconnection longer than the dwell bound.
    FailoverTimeout {
        /// The group.
        tag: GroupKey,

        /// When reconnection started.
        since: DateTime<Utc>,

        /// The bound that was exceeded.
        #[serde(with = "duration_secs")]
        dwell: Duration,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SplitGroupDetected { tag, nodes } => {
                let nodes: Vec<&str> = nodes.iter().map(NodeId::as_str).collect();
                write!(f, "split group {tag} across nodes {}", nodes.join(","))
            }
            Self::PartialSnapshot { unreachable } => {
                write!(f, "partial snapshot, unreachable: {}", unreachable.join(","))
            }
            Self::FailoverTimeout { tag, since, dwell } => write!(
                f,
                "group {tag} reconnecting since {} exceeded {}s",
                since.to_rfc3339(),
                dwell.as_secs()
            ),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_serialises_flat() {
        let status = NodeStatus {
            address: "QM2".to_string(),
            outcome: NodeOutcome::Unreachable {
                kind: FailureKind::ConnectTimeout,
                reason: "no answer within 5s".to_string(),
            },
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["address"], "QM2");
        assert_eq!(value["outcome"], "unreachable");
        assert_eq!(value["kind"], "connect_timeout");
    }

    #[test]
    fn test_split_group_display() {
        let anomaly = Anomaly::SplitGroupDetected {
            tag: GroupKey::Tagged("UC1".to_string()),
            nodes: vec![NodeId::new("QM1"), NodeId::new("QM3")],
        };
        assert_eq!(anomaly.to_string(), "split group UC1 across nodes QM1,QM3");
    }
}
