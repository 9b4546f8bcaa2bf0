//! Durations written as human readable strings such as "60s", "500ms" or "1m30s".

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer, de};

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(text.trim())
        .map_err(|e| de::Error::custom(format!("invalid duration {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct Holder {
        #[serde(with = "super")]
        value: Duration,
    }

    fn parse(text: &str) -> Result<Duration, toml::de::Error> {
        toml::from_str::<Holder>(&format!("value = {text:?}")).map(|holder| holder.value)
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!(parse("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse("soon").is_err());
        assert!(parse("").is_err());
        assert!(parse("10 parsecs").is_err());
    }

    #[test]
    fn test_written_form_reads_back() {
        let holder = Holder {
            value: Duration::from_secs(90),
        };
        let text = toml::to_string(&holder).unwrap();
        assert_eq!(text.trim(), r#"value = "1m 30s""#);

        let holder: Holder = toml::from_str(&text).unwrap();
        assert_eq!(holder.value, Duration::from_secs(90));
    }
}
