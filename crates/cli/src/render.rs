//! Table and JSON output.

use std::io::{self, Write};

use affinity_correlation::{Affinity, GroupAnalysis, SnapshotReport};
use affinity_model::{ConnectionRecord, Field, NodeOutcome};
use affinity_monitor::MonitorEvent;
use clap::ValueEnum;

/// Output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human readable table
    #[default]
    Table,

    /// JSON, one document per report or event
    Json,
}

fn field<T: ToString>(value: &Field<T>) -> String {
    value
        .known()
        .map_or_else(|| "-".to_string(), ToString::to_string)
}

const fn verdict(affinity: Affinity) -> &'static str {
    match affinity {
        Affinity::Confirmed => "confirmed",
        Affinity::SharedTag => "shared-tag",
        Affinity::Split => "SPLIT",
    }
}

const fn evidence(shared: Option<bool>) -> &'static str {
    match shared {
        Some(true) => "shared",
        Some(false) => "MISMATCH",
        None => "-",
    }
}

fn write_member(out: &mut impl Write, role: &str, record: &ConnectionRecord) -> io::Result<()> {
    writeln!(
        out,
        "    {role:<6} {:<16}  {:<8}  {:>7}  {:>5}  {}",
        record.connection_id.short(),
        record.node_id.as_str(),
        field(&record.process_id),
        field(&record.thread_id),
        field(&record.remote_address),
    )
}

fn write_group(out: &mut impl Write, group: &GroupAnalysis) -> io::Result<()> {
    let nodes: Vec<&str> = group.nodes.iter().map(|node| node.as_str()).collect();
    writeln!(
        out,
        "{:<24}  {:<12}  {:>4}  {:<8}  {:<8}  {}",
        group.key.to_string(),
        nodes.join(","),
        group.size(),
        evidence(group.shared_connection_tag),
        evidence(group.shared_extended_connection),
        verdict(group.affinity)
    )?;

    write_member(out, "parent", &group.parent)?;
    for child in &group.children {
        write_member(out, "child", child)?;
    }

    Ok(())
}

/// Write a snapshot report as a table.
pub fn write_table(out: &mut impl Write, report: &SnapshotReport) -> io::Result<()> {
    writeln!(out, "snapshot taken {}", report.taken_at.to_rfc3339())?;
    writeln!(out)?;

    for status in &report.nodes {
        match &status.outcome {
            NodeOutcome::Answered {
                node_id,
                connections,
            } => writeln!(
                out,
                "{:<24}  {node_id}: {connections} connections",
                status.address
            )?,
            NodeOutcome::Unreachable { kind, reason } => {
                writeln!(out, "{:<24}  UNREACHABLE {kind}: {reason}", status.address)?;
            }
        }
    }
    writeln!(out)?;

    if report.groups.is_empty() {
        writeln!(out, "no tagged connections")?;
    } else {
        writeln!(out, "distribution of tagged connections:")?;
        for share in &report.distribution {
            writeln!(
                out,
                "  {:<12}  {:>5}  {:>5.1}%",
                share.node_id.as_str(),
                share.connections,
                share.percent
            )?;
        }
        writeln!(out)?;

        writeln!(
            out,
            "{:<24}  {:<12}  {:>4}  {:<8}  {:<8}  VERDICT",
            "TAG", "NODES", "SIZE", "CONNTAG", "EXTCONN"
        )?;
        for group in &report.groups {
            write_group(out, group)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "untagged connections: {}", report.untagged)?;

    for anomaly in &report.anomalies {
        writeln!(out, "anomaly: {anomaly}")?;
    }

    Ok(())
}

/// Write a snapshot report in the requested format.
pub fn write_report(out: &mut impl Write, report: &SnapshotReport, format: Format) -> io::Result<()> {
    match format {
        Format::Table => write_table(out, report),
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, report)?;
            writeln!(out)
        }
    }
}

/// Write one watch event. Table output leaves out the per-poll snapshot.
pub fn write_event(out: &mut impl Write, event: &MonitorEvent, format: Format) -> io::Result<()> {
    match format {
        Format::Table => match event {
            MonitorEvent::Snapshot(_) => Ok(()),
            event => writeln!(out, "{event}"),
        },
        Format::Json => {
            serde_json::to_writer(&mut *out, event)?;
            writeln!(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use affinity_model::{Anomaly, ConnectionId, FailureKind, GroupKey, NodeId, NodeStatus};
    use chrono::{TimeZone, Utc};

    use super::*;

    fn record(id: u64, tag: &str, node: &str, pid: u32) -> ConnectionRecord {
        ConnectionRecord::new(
            ConnectionId::new(format!("{id:016X}")),
            Some(tag),
            NodeId::new(node),
            Utc.with_ymd_and_hms(2025, 9, 13, 1, 11, 0).unwrap(),
        )
        .with_provenance(pid, 17)
        .with_transport("APP.SVRCONN", "10.0.2.15")
    }

    fn report() -> SnapshotReport {
        let mut records: Vec<ConnectionRecord> =
            (0x10..0x16).map(|id| record(id, "UC1", "QM1", 4242)).collect();
        records.push(record(0x20, "UC2", "QM1", 7));
        records.push(record(0x21, "UC2", "QM2", 7));

        SnapshotReport::build(
            Utc.with_ymd_and_hms(2025, 9, 13, 1, 11, 0).unwrap(),
            vec![
                NodeStatus {
                    address: "QM1".to_string(),
                    outcome: NodeOutcome::Answered {
                        node_id: NodeId::new("QM1"),
                        connections: 7,
                    },
                },
                NodeStatus {
                    address: "QM3".to_string(),
                    outcome: NodeOutcome::Unreachable {
                        kind: FailureKind::ConnectTimeout,
                        reason: "no answer".to_string(),
                    },
                },
            ],
            records,
        )
    }

    #[test]
    fn test_table_lists_parent_children_and_anomalies() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), Format::Table).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("UNREACHABLE ConnectTimeout: no answer"));
        assert_eq!(text.matches("parent").count(), 2);
        assert_eq!(text.matches("child").count(), 6);
        assert!(text.contains("confirmed"));
        assert!(text.contains("SPLIT"));
        assert!(text.contains("anomaly: split group UC2 across nodes QM1,QM2"));
        assert!(text.contains("anomaly: partial snapshot, unreachable: QM3"));
        assert!(text.contains("distribution of tagged connections:"));
        assert!(text.contains("  QM1               7   87.5%"));
        assert!(text.contains("  QM2               1   12.5%"));
    }

    #[test]
    fn test_table_flags_connection_tag_mismatch() {
        let extconn = "414D5143514D31202020202020202020";
        let mut records: Vec<ConnectionRecord> = (0x10..0x13)
            .map(|id| {
                record(id, "UC1", "QM1", 4242)
                    .with_connection_tag("MQCT8A11C06800400040QM1_2025-09-05_02.13.42UC1", extconn)
            })
            .collect();
        records[2] = records[2]
            .clone()
            .with_connection_tag("MQCT8A11C06800990040QM1_2025-09-05_02.13.42UC1", extconn);
        let report = SnapshotReport::build(
            Utc.with_ymd_and_hms(2025, 9, 13, 1, 11, 0).unwrap(),
            Vec::new(),
            records,
        );

        let mut out = Vec::new();
        write_report(&mut out, &report, Format::Table).unwrap();
        let text = String::from_utf8(out).unwrap();

        let line = text.lines().find(|line| line.starts_with("UC1")).unwrap();
        assert!(line.contains("MISMATCH"));
        assert!(line.contains("shared"));
        assert!(line.ends_with("shared-tag"));
    }

    #[test]
    fn test_json_report() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["groups"][0]["key"], "UC1");
        assert_eq!(value["groups"][1]["affinity"], "split");
        assert_eq!(value["anomalies"].as_array().unwrap().len(), 2);
        assert_eq!(value["distribution"][0]["node_id"], "QM1");
        assert_eq!(value["distribution"][0]["connections"], 7);
        assert_eq!(value["groups"][0]["shared_connection_tag"], serde_json::Value::Null);
    }

    #[test]
    fn test_table_events_skip_snapshots() {
        let mut out = Vec::new();
        write_event(&mut out, &MonitorEvent::Snapshot(Box::new(report())), Format::Table).unwrap();
        assert!(out.is_empty());

        let anomaly = MonitorEvent::Anomaly(Anomaly::SplitGroupDetected {
            tag: GroupKey::Tagged("UC2".to_string()),
            nodes: vec![NodeId::new("QM1"), NodeId::new("QM2")],
        });
        write_event(&mut out, &anomaly, Format::Table).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "anomaly: split group UC2 across nodes QM1,QM2\n"
        );
    }

    #[test]
    fn test_json_events_are_lines() {
        let mut out = Vec::new();
        write_event(&mut out, &MonitorEvent::Snapshot(Box::new(report())), Format::Json).unwrap();
        write_event(
            &mut out,
            &MonitorEvent::Anomaly(Anomaly::PartialSnapshot {
                unreachable: vec!["QM3".to_string()],
            }),
            Format::Json,
        )
        .unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0]["event"], "snapshot");
        assert_eq!(lines[1]["event"], "anomaly");
        assert_eq!(lines[1]["anomaly"], "partial_snapshot");
    }
}
