use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GroupKey, NodeId};

/// Result of comparing one group across two snapshots.
///
/// `after_node`, `group_size_after`, `moved` and `intact` are `None` when the later
/// snapshot could not be obtained.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// The group being compared.
    pub tag: GroupKey,

    /// Node hosting the group before.
    pub before_node: NodeId,

    /// Node hosting the group after.
    pub after_node: Option<NodeId>,

    /// Members before.
    pub group_size_before: usize,

    /// Members after.
    pub group_size_after: Option<usize>,

    /// Whether the group changed node.
    pub moved: Option<bool>,

    /// Whether the group kept one node and the same number of children on both sides.
    pub intact: Option<bool>,

    /// When the comparison was made.
    pub observed_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Members lost between the two snapshots (zero if the group grew or is unknown).
    #[must_use]
    pub fn members_lost(&self) -> usize {
        self.group_size_after
            .map_or(0, |after| self.group_size_before.saturating_sub(after))
    }
}
