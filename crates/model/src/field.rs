use std::fmt;

use serde::{Deserialize, Serialize};

/// An optional connection attribute.
///
/// Brokers omit attributes depending on the query shape and their version. An absent
/// attribute is recorded as `Unknown` instead of dropping the whole record. `Known`
/// values order before `Unknown`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<T>", into = "Option<T>")]
#[serde(bound(
    serialize = "T: Clone + Serialize",
    deserialize = "T: Deserialize<'de>"
))]
pub enum Field<T> {
    /// The broker returned a value.
    Known(T),

    /// The broker did not return this attribute.
    #[default]
    Unknown,
}

impl<T> Field<T> {
    /// Returns the value if known.
    pub const fn known(&self) -> Option<&T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown => None,
        }
    }

    /// Returns true if the broker returned a value.
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Maps the known value.
    pub fn map<U, F>(self, f: F) -> Field<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Known(value) => Field::Known(f(value)),
            Self::Unknown => Field::Unknown,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unknown, Self::Known)
    }
}

impl<T> From<Field<T>> for Option<T> {
    fn from(value: Field<T>) -> Self {
        match value {
            Field::Known(value) => Some(value),
            Field::Unknown => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(value) => value.fmt(f),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_orders_before_unknown() {
        let mut values = vec![Field::Unknown, Field::Known(7), Field::Known(3)];
        values.sort();
        assert_eq!(values, vec![Field::Known(3), Field::Known(7), Field::Unknown]);
    }

    #[test]
    fn test_serializes_as_nullable_value() {
        let json = serde_json::to_string(&vec![Field::Known(42u32), Field::Unknown]).unwrap();
        assert_eq!(json, "[42,null]");

        let back: Vec<Field<u32>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Field::Known(42), Field::Unknown]);
    }

    #[test]
    fn test_display_unknown() {
        assert_eq!(Field::<u32>::Unknown.to_string(), "unknown");
        assert_eq!(Field::Known("APP.SVRCONN").to_string(), "APP.SVRCONN");
    }
}
