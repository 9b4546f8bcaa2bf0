use std::fmt;

use serde::{Deserialize, Serialize};

/// Selects connections by correlation tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFilter {
    /// The tag must equal this value.
    Exact(String),

    /// The tag must start with this value.
    Prefix(String),
}

impl TagFilter {
    /// Returns true if a connection with this tag is selected. Blank tags never match.
    #[must_use]
    pub fn matches(&self, tag: Option<&str>) -> bool {
        let Some(tag) = tag.map(str::trim).filter(|tag| !tag.is_empty()) else {
            return false;
        };

        match self {
            Self::Exact(expected) => tag == expected,
            Self::Prefix(prefix) => tag.starts_with(prefix.as_str()),
        }
    }

    /// The raw value of the filter.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Exact(value) | Self::Prefix(value) => value,
        }
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(value) => write!(f, "{value}"),
            Self::Prefix(value) => write!(f, "{value}*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let filter = TagFilter::Exact("PCF12345".to_string());
        assert!(filter.matches(Some("PCF12345")));
        assert!(filter.matches(Some("PCF12345    ")));
        assert!(!filter.matches(Some("PCF123456")));
        assert!(!filter.matches(None));
    }

    #[test]
    fn test_prefix_match() {
        let filter = TagFilter::Prefix("FAILOVER-".to_string());
        assert!(filter.matches(Some("FAILOVER-C1")));
        assert!(filter.matches(Some("FAILOVER-")));
        assert!(!filter.matches(Some("FAIL")));
        assert!(!filter.matches(Some("   ")));
    }

    #[test]
    fn test_display() {
        assert_eq!(TagFilter::Prefix("UC".to_string()).to_string(), "UC*");
        assert_eq!(TagFilter::Exact("UC1".to_string()).to_string(), "UC1");
    }
}
