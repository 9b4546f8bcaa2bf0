use affinity_model::MovementRecord;
use chrono::{DateTime, Utc};

use crate::GroupAnalysis;

/// Compare one group across two snapshots.
///
/// `after` is `None` when the later snapshot could not be obtained; the outcome is then
/// unknown rather than assumed.
#[must_use]
pub fn diff(
    before: &GroupAnalysis,
    after: Option<&GroupAnalysis>,
    observed_at: DateTime<Utc>,
) -> MovementRecord {
    MovementRecord {
        tag: before.key.clone(),
        before_node: before.node_id().clone(),
        after_node: after.map(|after| after.node_id().clone()),
        group_size_before: before.size(),
        group_size_after: after.map(GroupAnalysis::size),
        moved: after.map(|after| after.node_id() != before.node_id()),
        intact: after.map(|after| {
            before.same_node && after.same_node && after.children.len() == before.children.len()
        }),
        observed_at,
    }
}
