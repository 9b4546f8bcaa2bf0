//! Continuous monitoring of connection groups across a broker cluster.
//!
//! `Monitor` polls every node through an `AdminQueryClient`, builds a `SnapshotReport`
//! per poll and feeds it to `GroupTracker`, whose per-group state machine reports
//! failovers as `MonitorEvent`s over a channel.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod event;
mod monitor;
mod serde_duration;
mod tracker;

pub use config::{MonitorConfig, TransportConfig, TransportKind};
pub use error::{Error, Result};
pub use event::{MonitorEvent, MonitorState};
pub use monitor::{Monitor, WatchSummary};
pub use tracker::GroupTracker;
