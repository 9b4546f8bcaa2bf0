//! Parent/child correlation of connection groups.
//!
//! `analyze` picks a parent connection for a group and checks that the group lives on
//! one node and, as corroborating evidence, in one client process. `diff` compares a
//! group across two snapshots. `SnapshotReport` runs both over a whole cluster snapshot
//! and collects the anomalies a caller must see.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod analysis;
mod movement;
mod report;

pub use analysis::{Affinity, GroupAnalysis, analyze};
pub use movement::diff;
pub use report::{NodeShare, SnapshotReport};
