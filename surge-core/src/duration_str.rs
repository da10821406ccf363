//! Serde helpers for human readable durations (`"10s"`, `"1m 30s"`, `"250ms"`).
//!
//! Plain integers are accepted as whole seconds.
use serde::{de, Deserializer, Serializer};
use std::fmt;
use std::time::Duration;

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
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl<'de> de::Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a duration such as \"10s\" or an integer number of seconds")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Duration::from_secs(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u64::try_from(v)
            .map(Duration::from_secs)
            .map_err(|_| E::custom("duration must not be negative"))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.is_finite() && v >= 0. {
            Ok(Duration::from_secs_f64(v))
        } else {
            Err(E::custom("duration must be a finite, non-negative number"))
        }
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        humantime::parse_duration(v.trim()).map_err(E::custom)
    }
}

pub mod option {
    use super::DurationVisitor;
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => super::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        value: Duration,
    }

    fn parse(yaml: &str) -> Result<Duration, serde_yaml::Error> {
        serde_yaml::from_str::<Wrapper>(yaml).map(|w| w.value)
    }

    #[test]
    fn parses_human_strings() {
        assert_eq!(parse("value: 10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse("value: 1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse("value: 250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn integers_are_seconds() {
        assert_eq!(parse("value: 30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse("value: 0.5").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("value: soon").is_err());
        assert!(parse("value: -3").is_err());
    }
}
