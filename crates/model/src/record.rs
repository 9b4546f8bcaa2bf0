use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConnectionId, Field, GroupKey, NodeId};

/// One observed connection on one broker node at one point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Broker-assigned identity (`CONN`).
    pub connection_id: ConnectionId,

    /// Application-supplied tag (`APPLTAG`), trimmed. `None` when blank.
    pub correlation_tag: Option<String>,

    /// Node currently hosting the connection.
    pub node_id: NodeId,

    /// Channel the connection arrived on (`CHANNEL`).
    pub channel: Field<String>,

    /// Remote address of the client (`CONNAME`).
    pub remote_address: Field<String>,

    /// Client process (`PID`).
    pub process_id: Field<u32>,

    /// Client thread (`TID`).
    pub thread_id: Field<u32>,

    /// User the connection runs as (`USERID`).
    pub user_id: Field<String>,

    /// Application type (`APPLTYPE`).
    pub application_type: Field<String>,

    /// Broker connection tag (`CONNTAG`).
    pub connection_tag: Field<String>,

    /// Extended connection identity (`EXTCONN`).
    pub extended_connection_id: Field<String>,

    /// When the snapshot that produced this record was taken.
    pub observed_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Create a record with only identity, tag and node known.
    pub fn new(
        connection_id: ConnectionId,
        correlation_tag: Option<&str>,
        node_id: NodeId,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id,
            correlation_tag: normalise_tag(correlation_tag),
            node_id,
            channel: Field::Unknown,
            remote_address: Field::Unknown,
            process_id: Field::Unknown,
            thread_id: Field::Unknown,
            user_id: Field::Unknown,
            application_type: Field::Unknown,
            connection_tag: Field::Unknown,
            extended_connection_id: Field::Unknown,
            observed_at,
        }
    }

    /// Set the client provenance.
    #[must_use]
    pub const fn with_provenance(mut self, process_id: u32, thread_id: u32) -> Self {
        self.process_id = Field::Known(process_id);
        self.thread_id = Field::Known(thread_id);
        self
    }

    /// Set the transport descriptors.
    #[must_use]
    pub fn with_transport(mut self, channel: impl Into<String>, remote: impl Into<String>) -> Self {
        self.channel = Field::Known(channel.into());
        self.remote_address = Field::Known(remote.into());
        self
    }

    /// Set the broker connection tag and extended connection identity.
    #[must_use]
    pub fn with_connection_tag(mut self, tag: impl Into<String>, extended: impl Into<String>) -> Self {
        self.connection_tag = Field::Known(tag.into());
        self.extended_connection_id = Field::Known(extended.into());
        self
    }

    /// Connection handle and the remainder of `CONNTAG`.
    ///
    /// The broker builds the tag as `MQCT`, a 16 digit hex handle, then the queue manager
    /// name and its start time. Returns `None` for an unknown or differently shaped tag.
    #[must_use]
    pub fn connection_handle(&self) -> Option<(&str, &str)> {
        let rest = self.connection_tag.known()?.strip_prefix(CONNTAG_PREFIX)?;
        let handle = rest.get(..CONNTAG_HANDLE_LEN)?;
        if !handle.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some((handle, &rest[CONNTAG_HANDLE_LEN..]))
    }

    /// Queue manager name carried in `EXTCONN`.
    ///
    /// `EXTCONN` is the hex encoding of `AMQC` followed by the space padded queue
    /// manager name.
    #[must_use]
    pub fn extended_connection_node(&self) -> Option<String> {
        let bytes = hex::decode(self.extended_connection_id.known()?).ok()?;
        let name = bytes.strip_prefix(EXTCONN_PREFIX)?;
        let name = String::from_utf8_lossy(name);
        let name = name.trim_end_matches([' ', '\0']);
        (!name.is_empty()).then(|| name.to_string())
    }

    /// The grouping key of this record.
    #[must_use]
    pub fn group_key(&self) -> GroupKey {
        GroupKey::from_tag(self.correlation_tag.as_deref())
    }

    /// Process and thread, if both are known.
    #[must_use]
    pub fn provenance(&self) -> Option<(u32, u32)> {
        match (self.process_id.known(), self.thread_id.known()) {
            (Some(pid), Some(tid)) => Some((*pid, *tid)),
            _ => None,
        }
    }
}

const CONNTAG_PREFIX: &str = "MQCT";
const CONNTAG_HANDLE_LEN: usize = 16;
const EXTCONN_PREFIX: &[u8] = b"AMQC";

pub(crate) fn normalise_tag(tag: Option<&str>) -> Option<String> {
    tag.map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_tag_is_untagged() {
        let record = ConnectionRecord::new(
            ConnectionId::new("01"),
            Some("     "),
            NodeId::new("QM1"),
            Utc::now(),
        );

        assert_eq!(record.correlation_tag, None);
        assert_eq!(record.group_key(), GroupKey::Untagged);
    }

    #[test]
    fn test_provenance_requires_both_ids() {
        let mut record =
            ConnectionRecord::new(ConnectionId::new("01"), Some("T"), NodeId::new("QM1"), Utc::now())
                .with_provenance(4242, 17);
        assert_eq!(record.provenance(), Some((4242, 17)));

        record.thread_id = Field::Unknown;
        assert_eq!(record.provenance(), None);
    }

    fn tagged(conntag: &str, extconn: &str) -> ConnectionRecord {
        ConnectionRecord::new(ConnectionId::new("01"), Some("T"), NodeId::new("QM1"), Utc::now())
            .with_connection_tag(conntag, extconn)
    }

    #[test]
    fn test_connection_handle_from_conntag() {
        let record = tagged(
            "MQCT8A11C06800400040QM1_2025-09-05_02.13.42UC1",
            "414D5143514D31202020202020202020",
        );

        assert_eq!(
            record.connection_handle(),
            Some(("8A11C06800400040", "QM1_2025-09-05_02.13.42UC1"))
        );
        assert_eq!(record.extended_connection_node().as_deref(), Some("QM1"));
    }

    #[test]
    fn test_malformed_evidence_is_unknown() {
        let record = tagged("CONNTAG", "not hex");
        assert_eq!(record.connection_handle(), None);
        assert_eq!(record.extended_connection_node(), None);

        let record = tagged("MQCTXYZ", "414D5143");
        assert_eq!(record.connection_handle(), None);
        assert_eq!(record.extended_connection_node(), None);

        let record = ConnectionRecord::new(ConnectionId::new("01"), None, NodeId::new("QM1"), Utc::now());
        assert_eq!(record.connection_handle(), None);
    }
}
