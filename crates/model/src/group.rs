//! Grouping of connection records by correlation tag.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ConnectionRecord;
use crate::record::normalise_tag;

/// The key a connection is grouped under.
///
/// Records with an empty or missing tag share the `Untagged` bucket, which sorts after
/// every real tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum GroupKey {
    /// A non-blank correlation tag.
    Tagged(String),

    /// Blank or missing tag.
    Untagged,
}

impl GroupKey {
    /// Build the key for a raw tag value.
    #[must_use]
    pub fn from_tag(tag: Option<&str>) -> Self {
        normalise_tag(tag).map_or(Self::Untagged, Self::Tagged)
    }

    /// The tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Tagged(tag) => Some(tag),
            Self::Untagged => None,
        }
    }
}

impl From<Option<String>> for GroupKey {
    fn from(value: Option<String>) -> Self {
        Self::from_tag(value.as_deref())
    }
}

impl From<GroupKey> for Option<String> {
    fn from(value: GroupKey) -> Self {
        match value {
            GroupKey::Tagged(tag) => Some(tag),
            GroupKey::Untagged => None,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tagged(tag) => f.write_str(tag),
            Self::Untagged => f.write_str("<untagged>"),
        }
    }
}

/// The records sharing one group key within a single snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionGroup {
    key: GroupKey,
    members: Vec<ConnectionRecord>,
}

impl ConnectionGroup {
    /// Create a group. Members are taken as-is; their keys are not rechecked.
    #[must_use]
    pub const fn new(key: GroupKey, members: Vec<ConnectionRecord>) -> Self {
        Self { key, members }
    }

    /// The group key.
    #[must_use]
    pub const fn key(&self) -> &GroupKey {
        &self.key
    }

    /// The member records in snapshot order.
    #[must_use]
    pub fn members(&self) -> &[ConnectionRecord] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.members.len()
    }

    /// True if the group has no members.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Group records by correlation tag.
///
/// Total and deterministic: every record ends up in exactly one bucket and keys iterate
/// in sorted order.
#[must_use]
pub fn group_by_tag<I>(records: I) -> BTreeMap<GroupKey, Vec<ConnectionRecord>>
where
    I: IntoIterator<Item = ConnectionRecord>,
{
    let mut grouped: BTreeMap<GroupKey, Vec<ConnectionRecord>> = BTreeMap::new();

    for record in records {
        grouped.entry(record.group_key()).or_default().push(record);
    }

    grouped
}

/// Group records and wrap each bucket as a `ConnectionGroup`.
#[must_use]
pub fn groups<I>(records: I) -> Vec<ConnectionGroup>
where
    I: IntoIterator<Item = ConnectionRecord>,
{
    group_by_tag(records)
        .into_iter()
        .map(|(key, members)| ConnectionGroup::new(key, members))
        .collect()
}
