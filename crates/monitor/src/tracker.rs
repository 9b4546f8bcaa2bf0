use std::collections::BTreeMap;
use std::time::Duration;

use affinity_correlation::{GroupAnalysis, SnapshotReport, diff};
use affinity_model::{Anomaly, GroupKey};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info};

use crate::{MonitorEvent, MonitorState};

#[derive(Clone, Copy, Debug)]
enum Phase {
    Stable,
    Reconnecting { since: DateTime<Utc> },
    TimedOut,
}

impl Phase {
    const fn state(self) -> MonitorState {
        match self {
            Self::Stable => MonitorState::Stable,
            Self::Reconnecting { .. } => MonitorState::Reconnecting,
            Self::TimedOut => MonitorState::FailoverTimeout,
        }
    }
}

#[derive(Debug)]
struct Tracked {
    baseline: GroupAnalysis,
    phase: Phase,
}

impl Tracked {
    fn enter(&mut self, key: &GroupKey, phase: Phase, at: DateTime<Utc>) -> MonitorEvent {
        let from = self.phase.state();
        self.phase = phase;
        info!("group {key}: {from} -> {}", phase.state());
        MonitorEvent::Transition {
            tag: key.clone(),
            from,
            to: phase.state(),
            at,
        }
    }
}

/// Per-group failover state machine.
///
/// Fed one `SnapshotReport` per poll. A group is tracked from the first snapshot in which
/// it is consistent (all members on one node); that analysis is its baseline. Time is
/// taken from the snapshots, never from the wall clock.
#[derive(Debug)]
pub struct GroupTracker {
    dwell: Duration,
    groups: BTreeMap<GroupKey, Tracked>,
}

impl GroupTracker {
    /// A tracker that gives reconnecting groups `dwell` to settle.
    #[must_use]
    pub const fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            groups: BTreeMap::new(),
        }
    }

    /// Current state of a group, if it is tracked.
    #[must_use]
    pub fn state(&self, key: &GroupKey) -> Option<MonitorState> {
        self.groups.get(key).map(|tracked| tracked.phase.state())
    }

    /// The analysis a group is compared against.
    #[must_use]
    pub fn baseline(&self, key: &GroupKey) -> Option<&GroupAnalysis> {
        self.groups.get(key).map(|tracked| &tracked.baseline)
    }

    /// Number of tracked groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True if no group is tracked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Advance every tracked group by one snapshot and start tracking new ones.
    ///
    /// A stable group whose members show up together on another node, no smaller than
    /// before, produces a movement and stays stable. A group that is gone while its
    /// node answered has closed and is no longer tracked. Otherwise a stable group that
    /// is not whole on its baseline node starts reconnection. A reconnecting group settles as
    /// soon as it is consistent and complete; a smaller consistent group is only accepted
    /// once the dwell has passed. A group with nothing consistent at that point times out,
    /// and is dropped once its node answers again without it.
    pub fn observe(&mut self, report: &SnapshotReport) -> Vec<MonitorEvent> {
        let now = report.taken_at;
        let dwell = TimeDelta::from_std(self.dwell).unwrap_or(TimeDelta::MAX);
        let mut events = Vec::new();
        let mut closed = Vec::new();

        for (key, tracked) in &mut self.groups {
            let consistent = report.group(key).filter(|analysis| analysis.same_node);
            let vanished =
                report.group(key).is_none() && report.answered(tracked.baseline.node_id());

            match tracked.phase {
                Phase::Stable => match consistent {
                    Some(current) if current.node_id() == tracked.baseline.node_id() => {
                        tracked.baseline = current.clone();
                    }
                    Some(current) if current.size() >= tracked.baseline.size() => {
                        info!(
                            "group {key} moved {} -> {} between polls",
                            tracked.baseline.node_id(),
                            current.node_id()
                        );
                        events.push(MonitorEvent::Movement(diff(
                            &tracked.baseline,
                            Some(current),
                            now,
                        )));
                        tracked.baseline = current.clone();
                    }
                    None if vanished => {
                        info!("group {key} closed on {}", tracked.baseline.node_id());
                        events.push(MonitorEvent::GroupClosed {
                            tag: key.clone(),
                            node: tracked.baseline.node_id().clone(),
                            at: now,
                        });
                        closed.push(key.clone());
                    }
                    _ => {
                        if !report.answered(tracked.baseline.node_id()) {
                            info!(
                                "group {key}: node {} did not answer",
                                tracked.baseline.node_id()
                            );
                        }
                        events.push(tracked.enter(key, Phase::Reconnecting { since: now }, now));
                    }
                },
                Phase::Reconnecting { since } => {
                    let expired = now - since >= dwell;

                    match consistent {
                        Some(current) if expired || current.size() >= tracked.baseline.size() => {
                            events.push(MonitorEvent::Movement(diff(
                                &tracked.baseline,
                                Some(current),
                                now,
                            )));
                            tracked.baseline = current.clone();
                            events.push(tracked.enter(key, Phase::Stable, now));
                        }
                        _ if !expired => {}
                        _ => {
                            error!(
                                "group {key} did not settle within {}",
                                humantime::format_duration(self.dwell)
                            );
                            events.push(tracked.enter(key, Phase::TimedOut, now));
                            events.push(MonitorEvent::Anomaly(Anomaly::FailoverTimeout {
                                tag: key.clone(),
                                since,
                                dwell: self.dwell,
                            }));
                            events.push(MonitorEvent::Movement(diff(&tracked.baseline, None, now)));
                        }
                    }
                }
                Phase::TimedOut => match consistent {
                    Some(current) => {
                        tracked.baseline = current.clone();
                        events.push(tracked.enter(key, Phase::Stable, now));
                    }
                    None if vanished => {
                        debug!(
                            "dropping timed out group {key}, {} answers without it",
                            tracked.baseline.node_id()
                        );
                        closed.push(key.clone());
                    }
                    None => {}
                },
            }
        }

        for key in &closed {
            self.groups.remove(key);
        }

        for analysis in report.groups.iter().filter(|analysis| analysis.same_node) {
            if self.groups.contains_key(&analysis.key) {
                continue;
            }

            info!(
                "tracking group {} on {} ({} connections)",
                analysis.key,
                analysis.node_id(),
                analysis.size()
            );
            events.push(MonitorEvent::GroupDiscovered {
                tag: analysis.key.clone(),
                node: analysis.node_id().clone(),
                size: analysis.size(),
                at: now,
            });
            self.groups.insert(
                analysis.key.clone(),
                Tracked {
                    baseline: analysis.clone(),
                    phase: Phase::Stable,
                },
            );
        }

        events
    }
}
