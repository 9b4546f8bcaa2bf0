//! Value types shared by the connection-group correlation monitor.
//!
//! This crate provides:
//! - Connection identity types (`ConnectionId`, `NodeId`)
//! - The per-connection `ConnectionRecord` and its `Field` sentinel
//! - Tag grouping (`GroupKey`, `ConnectionGroup`, `group_by_tag`)
//! - Snapshot outcomes and anomalies (`NodeStatus`, `Anomaly`, `MovementRecord`)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod field;
mod filter;
mod group;
mod identity;
mod movement;
mod record;
mod status;

pub use field::Field;
pub use filter::TagFilter;
pub use group::{ConnectionGroup, GroupKey, group_by_tag, groups};
pub use identity::{ConnectionId, NodeId};
pub use movement::MovementRecord;
pub use record::ConnectionRecord;
pub use status::{Anomaly, FailureKind, NodeOutcome, NodeStatus};
