use std::cmp::Ordering;
use std::collections::BTreeSet;

use affinity_model::{ConnectionGroup, ConnectionRecord, GroupKey, NodeId};
use serde::{Deserialize, Serialize};

/// How strongly a group's members are shown to belong together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    /// One node, one known client process and thread, and no connection tag
    /// evidence against the parent.
    Confirmed,

    /// One node, but the members come from different or unknown client processes, or
    /// a member's connection tag contradicts the parent's. Either unrelated
    /// applications reuse the tag or provenance is unproven.
    SharedTag,

    /// The members are spread across nodes.
    Split,
}

/// Result of analysing one connection group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAnalysis {
    /// The group.
    pub key: GroupKey,

    /// The member taken to be the parent connection.
    pub parent: ConnectionRecord,

    /// Every other member, in parent-selection order.
    pub children: Vec<ConnectionRecord>,

    /// Distinct nodes hosting members, sorted.
    pub nodes: Vec<NodeId>,

    /// All members report the same node.
    pub same_node: bool,

    /// All members share one known process and one known thread.
    pub same_process: bool,

    /// Distinct known process ids.
    pub unique_process_ids: usize,

    /// Distinct known thread ids.
    pub unique_thread_ids: usize,

    /// Distinct known remote addresses.
    pub unique_remote_addresses: usize,

    /// Every member carries the parent's `CONNTAG` handle and queue manager, and the
    /// queue manager is the member's node. `None` when some member has no usable tag.
    pub shared_connection_tag: Option<bool>,

    /// Every member carries the parent's `EXTCONN` and it names the member's node.
    /// `None` when some member has no usable value.
    pub shared_extended_connection: Option<bool>,

    /// Overall verdict.
    pub affinity: Affinity,
}

impl GroupAnalysis {
    /// Node hosting the parent connection.
    #[must_use]
    pub const fn node_id(&self) -> &NodeId {
        &self.parent.node_id
    }

    /// Number of members, parent included.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.children.len() + 1
    }
}

/// Parent selection order: connection id, then records with known provenance before
/// unknown ones, then process/thread, then node.
fn parent_order(a: &ConnectionRecord, b: &ConnectionRecord) -> Ordering {
    a.connection_id
        .cmp(&b.connection_id)
        .then_with(|| match (a.provenance(), b.provenance()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.node_id.cmp(&b.node_id))
}

fn shared_connection_tag<'a>(
    parent: &ConnectionRecord,
    members: impl Iterator<Item = &'a ConnectionRecord>,
) -> Option<bool> {
    let (handle, _) = parent.connection_handle()?;
    let mut shared = true;

    for member in members {
        let (member_handle, queue_manager) = member.connection_handle()?;
        shared &= member_handle == handle && queue_manager.starts_with(member.node_id.as_str());
    }

    Some(shared)
}

fn shared_extended_connection<'a>(
    parent: &ConnectionRecord,
    members: impl Iterator<Item = &'a ConnectionRecord>,
) -> Option<bool> {
    let extended = parent.extended_connection_id.known()?;
    let mut shared = true;

    for member in members {
        let node = member.extended_connection_node()?;
        shared &= member.extended_connection_id.known() == Some(extended)
            && member.node_id.as_str().starts_with(&node);
    }

    Some(shared)
}

/// Analyse one group. Returns `None` for an empty group.
///
/// The parent is the member with the lowest connection id. Brokers hand out
/// connection ids in increasing order, so the first connection an application opens
/// usually sorts first; this is a heuristic, not something the broker guarantees.
#[must_use]
pub fn analyze(group: &ConnectionGroup) -> Option<GroupAnalysis> {
    let mut members = group.members().to_vec();
    members.sort_by(parent_order);

    let mut members = members.into_iter();
    let parent = members.next()?;
    let children: Vec<ConnectionRecord> = members.collect();
    let all = || std::iter::once(&parent).chain(children.iter());

    let nodes: Vec<NodeId> = all()
        .map(|r| r.node_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let process_ids: BTreeSet<u32> = all().filter_map(|r| r.process_id.known().copied()).collect();
    let thread_ids: BTreeSet<u32> = all().filter_map(|r| r.thread_id.known().copied()).collect();
    let remote_addresses: BTreeSet<&str> = all()
        .filter_map(|r| r.remote_address.known().map(String::as_str))
        .collect();

    let same_node = nodes.len() == 1;
    let same_process = all().all(|r| r.provenance().is_some())
        && process_ids.len() == 1
        && thread_ids.len() == 1;

    let shared_connection_tag = shared_connection_tag(&parent, all());
    let shared_extended_connection = shared_extended_connection(&parent, all());
    let contradicted =
        shared_connection_tag == Some(false) || shared_extended_connection == Some(false);

    let affinity = match (same_node, same_process && !contradicted) {
        (false, _) => Affinity::Split,
        (true, true) => Affinity::Confirmed,
        (true, false) => Affinity::SharedTag,
    };

    Some(GroupAnalysis {
        key: group.key().clone(),
        unique_process_ids: process_ids.len(),
        unique_thread_ids: thread_ids.len(),
        unique_remote_addresses: remote_addresses.len(),
        shared_connection_tag,
        shared_extended_connection,
        parent,
        children,
        nodes,
        same_node,
        same_process,
        affinity,
    })
}

#[cfg(test)]
mod tests {
    use affinity_model::{ConnectionId, Field, groups};

    use super::*;
    use crate::fixtures::{EXTCONN_QM1, conntag, connection_group, group, record};

    #[test]
    fn test_one_connection_five_sessions_on_one_node() {
        let analysis = analyze(&connection_group(group("UC1", "QM1", 0x8A11_C068_0040_0040, 5))).unwrap();

        assert_eq!(analysis.parent.connection_id.as_str(), "8A11C06800400040");
        assert_eq!(analysis.children.len(), 5);
        assert!(analysis.same_node);
        assert!(analysis.same_process);
        assert_eq!(analysis.affinity, Affinity::Confirmed);
        assert_eq!(analysis.node_id().as_str(), "QM1");
        assert_eq!(analysis.size(), 6);
    }

    #[test]
    fn test_parent_is_lowest_connection_id_whatever_the_order() {
        let mut records = group("UC1", "QM1", 0x100, 3);
        records.reverse();

        let analysis = analyze(&connection_group(records)).unwrap();

        assert_eq!(analysis.parent.connection_id, ConnectionId::new("0000000000000100"));
        let child_ids: Vec<&str> = analysis.children.iter().map(|r| r.connection_id.as_str()).collect();
        assert_eq!(child_ids, ["0000000000000101", "0000000000000102", "0000000000000103"]);
    }

    #[test]
    fn test_exactly_one_parent_per_group() {
        let mut records = group("UC1", "QM1", 0x10, 5);
        records.extend(group("UC2", "QM2", 0x20, 0));
        records.extend(group("UC3", "QM1", 0x30, 2));

        for candidate in groups(records) {
            let analysis = analyze(&candidate).unwrap();
            assert_eq!(analysis.size(), candidate.len());
            assert!(
                !analysis
                    .children
                    .iter()
                    .any(|child| child.connection_id == analysis.parent.connection_id)
            );
        }
    }

    #[test]
    fn test_group_of_one() {
        let analysis = analyze(&connection_group(group("SOLO", "QM2", 1, 0))).unwrap();

        assert!(analysis.children.is_empty());
        assert!(analysis.same_node);
        assert_eq!(analysis.affinity, Affinity::Confirmed);
    }

    #[test]
    fn test_empty_group_has_no_analysis() {
        assert!(analyze(&ConnectionGroup::new(GroupKey::Untagged, Vec::new())).is_none());
    }

    #[test]
    fn test_two_processes_sharing_a_tag() {
        let mut records = group("SHARED", "QM1", 0x10, 2);
        records.push(record(0x40, "SHARED", "QM1", 9001, 3));
        records.push(record(0x41, "SHARED", "QM1", 9001, 3));

        let analysis = analyze(&connection_group(records)).unwrap();

        assert_eq!(analysis.size(), 5);
        assert!(analysis.same_node);
        assert!(!analysis.same_process);
        assert_eq!(analysis.unique_process_ids, 2);
        assert_eq!(analysis.affinity, Affinity::SharedTag);
    }

    #[test]
    fn test_unknown_provenance_is_not_confirmed() {
        let mut records = group("UC1", "QM1", 0x10, 2);
        records[1].process_id = Field::Unknown;

        let analysis = analyze(&connection_group(records)).unwrap();

        assert!(!analysis.same_process);
        assert_eq!(analysis.unique_process_ids, 1);
        assert_eq!(analysis.affinity, Affinity::SharedTag);
    }

    #[test]
    fn test_split_group() {
        let mut records = group("UC1", "QM1", 0x10, 2);
        records.extend(group("UC1", "QM3", 0x90, 1));

        let analysis = analyze(&connection_group(records)).unwrap();

        assert!(!analysis.same_node);
        assert_eq!(analysis.nodes, vec![NodeId::new("QM1"), NodeId::new("QM3")]);
        assert_eq!(analysis.affinity, Affinity::Split);
    }

    #[test]
    fn test_equal_ids_prefer_known_provenance_then_node() {
        let mut unknown = record(0x10, "UC1", "QM1", 1, 1);
        unknown.process_id = Field::Unknown;
        let known = record(0x10, "UC1", "QM2", 7, 7);

        let analysis = analyze(&connection_group(vec![unknown, known])).unwrap();
        assert_eq!(analysis.parent.node_id.as_str(), "QM2");

        let analysis = analyze(&connection_group(vec![
            record(0x10, "UC1", "QM3", 7, 7),
            record(0x10, "UC1", "QM2", 7, 7),
        ]))
        .unwrap();
        assert_eq!(analysis.parent.node_id.as_str(), "QM2");
    }

    #[test]
    fn test_connection_tag_evidence_unknown_without_full_shape() {
        let analysis = analyze(&connection_group(group("UC1", "QM1", 0x10, 3))).unwrap();

        assert_eq!(analysis.shared_connection_tag, None);
        assert_eq!(analysis.shared_extended_connection, None);
        assert_eq!(analysis.affinity, Affinity::Confirmed);
    }

    #[test]
    fn test_sessions_share_parent_connection_tag() {
        let records = group("UC1", "QM1", 0x10, 5)
            .into_iter()
            .map(|r| r.with_connection_tag(conntag("8A11C06800400040", "QM1", "UC1"), EXTCONN_QM1))
            .collect();

        let analysis = analyze(&connection_group(records)).unwrap();

        assert_eq!(analysis.shared_connection_tag, Some(true));
        assert_eq!(analysis.shared_extended_connection, Some(true));
        assert_eq!(analysis.affinity, Affinity::Confirmed);
    }

    #[test]
    fn test_child_with_foreign_connection_tag_is_not_confirmed() {
        let mut records: Vec<ConnectionRecord> = group("UC1", "QM1", 0x10, 3)
            .into_iter()
            .map(|r| r.with_connection_tag(conntag("8A11C06800400040", "QM1", "UC1"), EXTCONN_QM1))
            .collect();
        records[2] = records[2]
            .clone()
            .with_connection_tag(conntag("8A11C06800990040", "QM1", "UC1"), EXTCONN_QM1);

        let analysis = analyze(&connection_group(records)).unwrap();

        assert!(analysis.same_process);
        assert_eq!(analysis.shared_connection_tag, Some(false));
        assert_eq!(analysis.shared_extended_connection, Some(true));
        assert_eq!(analysis.affinity, Affinity::SharedTag);
    }

    #[test]
    fn test_connection_tag_naming_another_node_is_not_shared() {
        let records = group("UC1", "QM2", 0x10, 2)
            .into_iter()
            .map(|r| r.with_connection_tag(conntag("8A11C06800400040", "QM1", "UC1"), EXTCONN_QM1))
            .collect();

        let analysis = analyze(&connection_group(records)).unwrap();

        assert_eq!(analysis.shared_connection_tag, Some(false));
        assert_eq!(analysis.shared_extended_connection, Some(false));
        assert_eq!(analysis.affinity, Affinity::SharedTag);
    }

    #[test]
    fn test_one_member_without_connection_tag_leaves_evidence_unknown() {
        let mut records: Vec<ConnectionRecord> = group("UC1", "QM1", 0x10, 2)
            .into_iter()
            .map(|r| r.with_connection_tag(conntag("8A11C06800400040", "QM1", "UC1"), EXTCONN_QM1))
            .collect();
        records[1].connection_tag = Field::Unknown;

        let analysis = analyze(&connection_group(records)).unwrap();

        assert_eq!(analysis.shared_connection_tag, None);
        assert_eq!(analysis.shared_extended_connection, Some(true));
        assert_eq!(analysis.affinity, Affinity::Confirmed);
    }
}
