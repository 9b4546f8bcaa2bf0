use std::collections::BTreeMap;

use affinity_model::{ConnectionId, ConnectionRecord, Field, NodeId};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Attribute names of a connection descriptor.
pub mod attr {
    /// Connection identity.
    pub const CONN: &str = "CONN";
    /// Application tag.
    pub const APPLTAG: &str = "APPLTAG";
    /// Channel name.
    pub const CHANNEL: &str = "CHANNEL";
    /// Remote connection name.
    pub const CONNAME: &str = "CONNAME";
    /// Client process.
    pub const PID: &str = "PID";
    /// Client thread.
    pub const TID: &str = "TID";
    /// User identifier.
    pub const USERID: &str = "USERID";
    /// Application type.
    pub const APPLTYPE: &str = "APPLTYPE";
    /// Broker connection tag.
    pub const CONNTAG: &str = "CONNTAG";
    /// Extended connection identity.
    pub const EXTCONN: &str = "EXTCONN";
}

/// The attributes a node returned for one connection, keyed by attribute name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    attributes: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    /// An empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute. Values are trimmed; blank values are dropped.
    pub fn insert(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.attributes.insert(name.into(), value.to_string());
        }
    }

    /// Builder form of `insert`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// True if no attribute was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Convert into a record. Returns `None` when the connection identity is missing.
    #[must_use]
    pub fn into_record(self, node_id: &NodeId, observed_at: DateTime<Utc>) -> Option<ConnectionRecord> {
        let Some(id) = self.get(attr::CONN) else {
            warn!(node = %node_id, "skipping connection descriptor without {}", attr::CONN);
            return None;
        };

        let mut record = ConnectionRecord::new(
            ConnectionId::new(id),
            self.get(attr::APPLTAG),
            node_id.clone(),
            observed_at,
        );

        record.channel = self.text(attr::CHANNEL);
        record.remote_address = self.text(attr::CONNAME);
        record.process_id = self.number(attr::PID, node_id);
        record.thread_id = self.number(attr::TID, node_id);
        record.user_id = self.text(attr::USERID);
        record.application_type = self.text(attr::APPLTYPE);
        record.connection_tag = self.text(attr::CONNTAG);
        record.extended_connection_id = self.text(attr::EXTCONN);

        Some(record)
    }

    fn text(&self, name: &str) -> Field<String> {
        self.get(name).map(ToString::to_string).into()
    }

    fn number(&self, name: &str, node_id: &NodeId) -> Field<u32> {
        match self.get(name).map(str::parse::<u32>) {
            Some(Ok(value)) => Field::Known(value),
            Some(Err(e)) => {
                warn!(node = %node_id, attribute = name, "ignoring non-numeric value: {e}");
                Field::Unknown
            }
            None => Field::Unknown,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ConnectionDescriptor
where
    K: Into<String>,
    V: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut descriptor = Self::new();
        for (name, value) in iter {
            descriptor.insert(name, value);
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_descriptor_to_record() {
        let descriptor = ConnectionDescriptor::new()
            .with(attr::CONN, "8a11c06800400040")
            .with(attr::APPLTAG, "PCF12345    ")
            .with(attr::CHANNEL, "APP.SVRCONN")
            .with(attr::CONNAME, "10.0.0.7(51234)")
            .with(attr::PID, "4242")
            .with(attr::TID, "17")
            .with(attr::USERID, "app");

        let record = descriptor
            .into_record(&NodeId::new("QM1"), Utc::now())
            .unwrap();

        assert_eq!(record.connection_id.as_str(), "8A11C06800400040");
        assert_eq!(record.correlation_tag.as_deref(), Some("PCF12345"));
        assert_eq!(record.provenance(), Some((4242, 17)));
        assert_eq!(record.user_id, Field::Known("app".to_string()));
        assert_eq!(record.connection_tag, Field::Unknown);
    }

    #[test]
    fn test_missing_identity_is_skipped() {
        let descriptor = ConnectionDescriptor::new().with(attr::APPLTAG, "PCF12345");
        assert!(descriptor.into_record(&NodeId::new("QM1"), Utc::now()).is_none());
    }

    #[test]
    fn test_non_numeric_pid_is_unknown() {
        let descriptor: ConnectionDescriptor =
            [(attr::CONN, "01"), (attr::PID, "n/a"), (attr::TID, "3")].into_iter().collect();

        let record = descriptor
            .into_record(&NodeId::new("QM1"), Utc::now())
            .unwrap();

        assert_eq!(record.process_id, Field::Unknown);
        assert_eq!(record.thread_id, Field::Known(3));
    }
}
