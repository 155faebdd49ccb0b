//! Human-friendly duration parsing for timeouts and retry delays.
//!
//! Accepts `"400ms"`, `"2s"`, `"1.5m"` or a bare number of seconds, so the
//! same value can come from config files written by hand or generated ones
//! that emit plain floats.

use std::time::Duration;

use crate::error::{VisionError, VisionResult};

/// Parses a duration string. Suffixes are case-insensitive; a bare number is
/// read as seconds. Negative and non-finite values are rejected.
pub fn parse_duration(text: &str) -> VisionResult<Duration> {
    let lowered = text.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(VisionError::invalid_config("empty duration"));
    }
    // "ms" must be tried before the plain "s" suffix.
    let (number, multiplier) = if let Some(v) = lowered.strip_suffix("ms") {
        (v, 0.001)
    } else if let Some(v) = lowered.strip_suffix('s') {
        (v, 1.0)
    } else if let Some(v) = lowered.strip_suffix('m') {
        (v, 60.0)
    } else {
        (lowered.as_str(), 1.0)
    };
    let value: f64 = number.trim().parse().map_err(|_| {
        VisionError::invalid_config(format!("unparseable duration {text:?}"))
    })?;
    from_secs(value * multiplier)
}

/// Converts fractional seconds to a `Duration`, rejecting values a deadline
/// arithmetic cannot represent.
pub fn from_secs(value: f64) -> VisionResult<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(VisionError::invalid_config(format!(
            "duration must be a non-negative number of seconds, got {value}"
        )));
    }
    // from_secs_f64 panics past Duration's range; try_from keeps it an error.
    Duration::try_from_secs_f64(value).map_err(|_| {
        VisionError::invalid_config(format!(
            "duration of {value} seconds is out of range"
        ))
    })
}

/// Serde adapter: a duration field that accepts either a number of seconds
/// or a suffixed string, and serializes back as fractional seconds.
pub mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(v) => super::from_secs(v),
            Raw::Text(s) => super::parse_duration(&s),
        }
        .map_err(de::Error::custom)
    }

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

/// Same adapter for optional fields; `null` and absent both mean "inherit".
pub mod serde_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Seconds(v)) => super::from_secs(v).map(Some).map_err(de::Error::custom),
            Some(Raw::Text(s)) => super::parse_duration(&s).map(Some).map_err(de::Error::custom),
        }
    }

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }
}
