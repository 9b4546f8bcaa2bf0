use std::fmt;

use affinity_model::TagFilter;
use serde::{Deserialize, Serialize};

/// The form of a connection inquiry.
///
/// Brokers differ in which forms they accept; the client probes `Minimal` first and
/// only upgrades to `Full` when the minimal form works.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryShape {
    /// Essential attributes only, no server-side filter.
    Minimal,

    /// Every attribute, with the tag filter applied by the node.
    Full,
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => f.write_str("minimal"),
            Self::Full => f.write_str("full"),
        }
    }
}

/// A connection inquiry as handed to a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InquireConnections {
    /// Form of the request.
    pub shape: QueryShape,

    /// Server-side tag filter. Always `None` for `Minimal`.
    pub filter: Option<TagFilter>,
}

impl InquireConnections {
    /// Build a request of the given shape. The filter is dropped for `Minimal`.
    #[must_use]
    pub fn new(shape: QueryShape, filter: Option<&TagFilter>) -> Self {
        let filter = match shape {
            QueryShape::Minimal => None,
            QueryShape::Full => filter.cloned(),
        };

        Self { shape, filter }
    }
}
