use std::collections::BTreeMap;

use affinity_model::{
    Anomaly, ConnectionGroup, ConnectionRecord, GroupKey, NodeId, NodeStatus, group_by_tag,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{GroupAnalysis, analyze};

/// Share of the tagged connections hosted by one answering node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeShare {
    /// The node.
    pub node_id: NodeId,

    /// Tagged connections on the node.
    pub connections: usize,

    /// Percentage of all tagged connections in the snapshot.
    pub percent: f64,
}

#[allow(clippy::cast_precision_loss)]
fn distribution(nodes: &[NodeStatus], groups: &[GroupAnalysis]) -> Vec<NodeShare> {
    let mut counts: BTreeMap<&NodeId, usize> = BTreeMap::new();
    for status in nodes {
        if let Some(node_id) = status.node_id() {
            counts.entry(node_id).or_default();
        }
    }

    for analysis in groups {
        let members = std::iter::once(&analysis.parent).chain(&analysis.children);
        for member in members {
            *counts.entry(&member.node_id).or_default() += 1;
        }
    }

    let total: usize = counts.values().sum();

    counts
        .into_iter()
        .map(|(node_id, connections)| NodeShare {
            node_id: node_id.clone(),
            connections,
            percent: if total == 0 {
                0.0
            } else {
                connections as f64 * 100.0 / total as f64
            },
        })
        .collect()
}

/// Analysis of one cluster snapshot.
///
/// Only tagged groups are analysed. Untagged connections (channel initiators, admin
/// sessions and the like) have nothing to correlate and are only counted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotReport {
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,

    /// What each queried node contributed.
    pub nodes: Vec<NodeStatus>,

    /// Tagged groups in key order.
    pub groups: Vec<GroupAnalysis>,

    /// Tagged connections per answering node, in node order.
    pub distribution: Vec<NodeShare>,

    /// Connections without a tag.
    pub untagged: usize,

    /// Anomalies found in this snapshot.
    pub anomalies: Vec<Anomaly>,
}

impl SnapshotReport {
    /// Group, analyse and check a snapshot.
    ///
    /// Emits `SplitGroupDetected` for every group found on more than one node and
    /// `PartialSnapshot` when some node did not answer.
    #[must_use]
    pub fn build(
        taken_at: DateTime<Utc>,
        nodes: Vec<NodeStatus>,
        records: Vec<ConnectionRecord>,
    ) -> Self {
        let mut untagged = 0;
        let mut groups = Vec::new();
        let mut anomalies = Vec::new();

        for (key, members) in group_by_tag(records) {
            if key == GroupKey::Untagged {
                untagged = members.len();
                continue;
            }

            let Some(analysis) = analyze(&ConnectionGroup::new(key, members)) else {
                continue;
            };

            if !analysis.same_node {
                anomalies.push(Anomaly::SplitGroupDetected {
                    tag: analysis.key.clone(),
                    nodes: analysis.nodes.clone(),
                });
            }

            groups.push(analysis);
        }

        let unreachable: Vec<String> = nodes
            .iter()
            .filter(|status| !status.is_answered())
            .map(|status| status.address.clone())
            .collect();

        if !unreachable.is_empty() {
            anomalies.push(Anomaly::PartialSnapshot { unreachable });
        }

        let distribution = distribution(&nodes, &groups);

        debug!(
            "snapshot at {taken_at}: {} groups, {untagged} untagged, {} anomalies",
            groups.len(),
            anomalies.len()
        );

        Self {
            taken_at,
            nodes,
            groups,
            distribution,
            untagged,
            anomalies,
        }
    }

    /// The analysis of one group.
    #[must_use]
    pub fn group(&self, key: &GroupKey) -> Option<&GroupAnalysis> {
        self.groups.iter().find(|analysis| &analysis.key == key)
    }

    /// True if some node did not answer.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.nodes.iter().any(|status| !status.is_answered())
    }

    /// True if the node answered in this snapshot.
    #[must_use]
    pub fn answered(&self, node_id: &NodeId) -> bool {
        self.nodes
            .iter()
            .any(|status| status.node_id() == Some(node_id))
    }

    /// Total connections across tagged groups.
    #[must_use]
    pub fn tagged_connections(&self) -> usize {
        self.groups.iter().map(GroupAnalysis::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use affinity_model::{FailureKind, NodeOutcome};
    use assert_matches::assert_matches;

    use super::*;
    use crate::Affinity;
    use crate::fixtures::{at, group, record};

    fn answered(node: &str, connections: usize) -> NodeStatus {
        NodeStatus {
            address: node.to_string(),
            outcome: NodeOutcome::Answered {
                node_id: NodeId::new(node),
                connections,
            },
        }
    }

    #[test]
    fn test_every_group_is_same_node_or_reported_split() {
        let mut records = group("UC1", "QM1", 0x10, 5);
        records.extend(group("UC2", "QM2", 0x20, 3));
        records.extend(group("UC3", "QM1", 0x30, 1));
        records.extend(group("UC3", "QM3", 0x40, 1));

        let report = SnapshotReport::build(
            at(0),
            vec![answered("QM1", 8), answered("QM2", 4), answered("QM3", 2)],
            records,
        );

        assert_eq!(report.groups.len(), 3);
        for analysis in &report.groups {
            let reported = report.anomalies.iter().any(|anomaly| {
                matches!(anomaly, Anomaly::SplitGroupDetected { tag, .. } if *tag == analysis.key)
            });
            assert!(analysis.same_node != reported);
        }

        let split = report.group(&GroupKey::Tagged("UC3".to_string())).unwrap();
        assert_eq!(split.affinity, Affinity::Split);
        assert!(!report.is_partial());
        assert_eq!(report.tagged_connections(), 14);
    }

    #[test]
    fn test_unreachable_node_makes_partial_snapshot() {
        let nodes = vec![
            answered("QM1", 6),
            NodeStatus {
                address: "QM2".to_string(),
                outcome: NodeOutcome::Unreachable {
                    kind: FailureKind::ConnectTimeout,
                    reason: "no answer within 5s".to_string(),
                },
            },
        ];

        let report = SnapshotReport::build(at(0), nodes, group("UC1", "QM1", 0x10, 5));

        assert!(report.is_partial());
        assert!(report.answered(&NodeId::new("QM1")));
        assert!(!report.answered(&NodeId::new("QM2")));
        assert_matches!(
            report.anomalies.as_slice(),
            [Anomaly::PartialSnapshot { unreachable }] if unreachable == &vec!["QM2".to_string()]
        );
    }

    #[test]
    fn test_untagged_connections_only_counted() {
        let mut records = group("UC1", "QM1", 0x10, 1);
        let mut system = record(0x01, "", "QM1", 112, 1);
        system.correlation_tag = None;
        records.push(system.clone());
        system.node_id = NodeId::new("QM2");
        records.push(system);

        let report = SnapshotReport::build(at(0), vec![answered("QM1", 3), answered("QM2", 1)], records);

        assert_eq!(report.untagged, 2);
        assert_eq!(report.groups.len(), 1);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn test_distribution_per_answering_node() {
        let mut records = group("UC1", "QM1", 0x10, 5);
        records.extend(group("UC2", "QM2", 0x20, 1));
        records.extend(group("UC3", "QM1", 0x30, 1));
        let nodes = vec![
            answered("QM1", 8),
            answered("QM2", 2),
            answered("QM3", 0),
            NodeStatus {
                address: "QM4".to_string(),
                outcome: NodeOutcome::Unreachable {
                    kind: FailureKind::ConnectTimeout,
                    reason: "no answer".to_string(),
                },
            },
        ];

        let report = SnapshotReport::build(at(0), nodes, records);

        let shares: Vec<(&str, usize)> = report
            .distribution
            .iter()
            .map(|share| (share.node_id.as_str(), share.connections))
            .collect();
        assert_eq!(shares, [("QM1", 8), ("QM2", 2), ("QM3", 0)]);
        assert!((report.distribution[0].percent - 80.0).abs() < f64::EPSILON);
        assert!((report.distribution[1].percent - 20.0).abs() < f64::EPSILON);
        assert!(report.distribution[2].percent.abs() < f64::EPSILON);
    }

    #[test]
    fn test_distribution_without_tagged_connections() {
        let report = SnapshotReport::build(at(0), vec![answered("QM1", 0)], Vec::new());

        assert_eq!(report.distribution.len(), 1);
        assert!(report.distribution[0].percent.abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_serialises() {
        let report = SnapshotReport::build(at(0), vec![answered("QM1", 6)], group("UC1", "QM1", 0x10, 5));
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["groups"][0]["key"], "UC1");
        assert_eq!(value["groups"][0]["affinity"], "confirmed");
        assert_eq!(value["groups"][0]["children"].as_array().unwrap().len(), 5);
        assert_eq!(value["distribution"][0]["node_id"], "QM1");
        assert_eq!(value["distribution"][0]["connections"], 6);
        assert_eq!(value["distribution"][0]["percent"], 100.0);
    }
}
