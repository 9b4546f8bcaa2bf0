//! MQSC text protocol shared by the command-line and REST transports.
//!
//! Both transports send the same `DISPLAY CONN` command and receive the same
//! `runmqsc` style response text, one `AMQ8276I` block per connection.

use std::fmt;
use std::sync::LazyLock;

use affinity_model::{FailureKind, TagFilter};
use regex::Regex;

use crate::{ConnectionDescriptor, InquireConnections, QueryShape};

/// Message code opening each connection block.
pub const CONNECTION_BLOCK: &str = "AMQ8276I";

/// Attribute pattern, e.g. `APPLTAG(PCF12345)`. Values may nest one level of
/// parentheses, as in `CONNAME(10.0.2.15(51234))`.
static ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][A-Z0-9]*)\(((?:[^()]|\([^()]*\))*)\)").expect("Invalid regex pattern")
});

/// Message code pattern, e.g. `AMQ8135E: Not authorized.`
static MESSAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(AMQ\d{4}[A-Z])[:\s]\s*(.*)$").expect("Invalid regex pattern")
});

/// Error codes and the failure class they map to.
const FAILURE_CODES: &[(&str, FailureKind)] = &[
    ("AMQ8135E", FailureKind::AuthorizationDenied),
    ("AMQ8146E", FailureKind::ConnectTimeout),
    ("AMQ8118E", FailureKind::ConnectTimeout),
    ("AMQ8405I", FailureKind::ProtocolError),
    ("AMQ8427I", FailureKind::ProtocolError),
];

/// A failure reported inside MQSC response text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqscFailure {
    /// Failure class.
    pub kind: FailureKind,

    /// The message code.
    pub code: String,

    /// The message text.
    pub message: String,
}

impl fmt::Display for MqscFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Render the `DISPLAY CONN` command for a request.
#[must_use]
pub fn render_inquiry(request: &InquireConnections) -> String {
    match request.shape {
        QueryShape::Minimal => "DISPLAY CONN(*) TYPE(CONN) APPLTAG CHANNEL CONNAME PID TID".to_string(),
        QueryShape::Full => match &request.filter {
            Some(filter) => format!("DISPLAY CONN(*) TYPE(CONN) WHERE({}) ALL", render_filter(filter)),
            None => "DISPLAY CONN(*) TYPE(CONN) ALL".to_string(),
        },
    }
}

fn render_filter(filter: &TagFilter) -> String {
    let value = filter.value().replace('\'', "''");
    match filter {
        TagFilter::Exact(_) => format!("APPLTAG EQ '{value}'"),
        TagFilter::Prefix(_) => format!("APPLTAG LK '{value}*'"),
    }
}

/// Parse response text into connection descriptors.
///
/// # Errors
///
/// Returns the first recognised failure message. Unknown messages are ignored.
pub fn parse_response(text: &str) -> Result<Vec<ConnectionDescriptor>, MqscFailure> {
    let mut descriptors = Vec::new();
    let mut current: Option<ConnectionDescriptor> = None;

    for line in text.lines() {
        if let Some(captures) = MESSAGE_REGEX.captures(line) {
            let code = &captures[1];

            if code == CONNECTION_BLOCK {
                if let Some(done) = current.replace(ConnectionDescriptor::new()) {
                    descriptors.push(done);
                }
                continue;
            }

            if let Some((_, kind)) = FAILURE_CODES.iter().find(|(known, _)| *known == code) {
                return Err(MqscFailure {
                    kind: *kind,
                    code: code.to_string(),
                    message: captures[2].trim().to_string(),
                });
            }

            continue;
        }

        let Some(descriptor) = current.as_mut() else {
            continue;
        };

        for captures in ATTRIBUTE_REGEX.captures_iter(line) {
            descriptor.insert(&captures[1], &captures[2]);
        }
    }

    descriptors.extend(current);

    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::attr;

    #[test]
    fn test_render_minimal_ignores_filter() {
        let request = InquireConnections::new(
            QueryShape::Minimal,
            Some(&TagFilter::Exact("PCF12345".to_string())),
        );
        assert_eq!(
            render_inquiry(&request),
            "DISPLAY CONN(*) TYPE(CONN) APPLTAG CHANNEL CONNAME PID TID"
        );
    }

    #[test]
    fn test_render_full_with_filters() {
        let exact = InquireConnections::new(
            QueryShape::Full,
            Some(&TagFilter::Exact("PCF12345".to_string())),
        );
        assert_eq!(
            render_inquiry(&exact),
            "DISPLAY CONN(*) TYPE(CONN) WHERE(APPLTAG EQ 'PCF12345') ALL"
        );

        let prefix = InquireConnections::new(
            QueryShape::Full,
            Some(&TagFilter::Prefix("O'BRIEN".to_string())),
        );
        assert_eq!(
            render_inquiry(&prefix),
            "DISPLAY CONN(*) TYPE(CONN) WHERE(APPLTAG LK 'O''BRIEN*') ALL"
        );
    }

    #[test]
    fn test_parse_sample_output() {
        let descriptors = parse_response(include_str!("../test_data/display_conn.txt")).unwrap();

        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[0].get(attr::CONN), Some("8A11C06800400040"));
        assert_eq!(descriptors[0].get(attr::APPLTAG), Some("PCF12345"));
        assert_eq!(descriptors[0].get(attr::PID), Some("4242"));
        assert_eq!(descriptors[0].get(attr::CONNAME), Some("10.0.2.15(51234)"));
        assert_eq!(descriptors[1].get(attr::TID), Some("18"));
        assert_eq!(descriptors[2].get(attr::APPLTAG), None);
    }

    #[test]
    fn test_parse_no_connections() {
        let text = "5724-H72 (C) Copyright IBM Corp. 1994, 2024.\n\
                    Starting MQSC for queue manager QM1.\n\
                    \n\
                         1 : DISPLAY CONN(*) TYPE(CONN) ALL\n\
                    One MQSC command read.\n";

        assert_eq!(parse_response(text).unwrap(), Vec::new());
    }

    #[test]
    fn test_parse_authorization_failure() {
        let text = "     1 : DISPLAY CONN(*) TYPE(CONN) ALL\n\
                    AMQ8135E: Not authorized.\n";

        assert_matches!(
            parse_response(text),
            Err(MqscFailure { kind: FailureKind::AuthorizationDenied, ref code, .. }) if code == "AMQ8135E"
        );
    }

    #[test]
    fn test_parse_syntax_error_is_protocol_error() {
        let text = "AMQ8405I: Syntax error detected at or near end of command segment below:-\n";

        assert_matches!(
            parse_response(text),
            Err(MqscFailure { kind: FailureKind::ProtocolError, .. })
        );
    }
}
