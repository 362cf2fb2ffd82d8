//! Timestamp parsing and coercion utilities.
//!
//! Timeline entries carry timestamps as seconds. Model output is not
//! trustworthy, so every timestamp field goes through [`coerce_seconds`],
//! which accepts plain numbers, `SS`, `MM:SS`, `HH:MM:SS` strings and
//! loosely formatted numeric text, and resolves anything else to `0`.

use serde_json::Value;
use thiserror::Error;

/// Parse a timestamp string to total seconds.
///
/// Supports formats:
/// - `HH:MM:SS` or `HH:MM:SS.mmm`
/// - `MM:SS` or `MM:SS.mmm`
/// - `SS` or `SS.mmm`
///
/// # Examples
/// ```
/// use lectern_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() > 3 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    let labels: &[&'static str] = match parts.len() {
        1 => &["seconds"],
        2 => &["minutes", "seconds"],
        _ => &["hours", "minutes", "seconds"],
    };

    let mut total = 0.0;
    for (part, label) in parts.iter().zip(labels) {
        let value: f64 = part
            .trim()
            .parse()
            .map_err(|_| TimestampError::InvalidValue(label, part.to_string()))?;
        if !value.is_finite() {
            return Err(TimestampError::InvalidValue(label, part.to_string()));
        }
        if value < 0.0 {
            return Err(TimestampError::Negative);
        }
        total = total * 60.0 + value;
    }

    Ok(total)
}

/// Format seconds as `MM:SS`, or `H:MM:SS` past the hour.
///
/// Negative and non-finite input formats as `00:00`.
pub fn format_clock(total_secs: f64) -> String {
    let total = if total_secs.is_finite() && total_secs > 0.0 {
        total_secs.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Coerce an untrusted JSON value into seconds.
///
/// Numbers pass through, strings go through [`coerce_seconds_str`], and
/// every other shape resolves to `0`.
pub fn coerce_seconds(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0),
        Value::String(s) => coerce_seconds_str(s),
        _ => 0.0,
    }
}

/// Coerce a loosely formatted timestamp string into seconds.
///
/// Tries a strict [`parse_timestamp`] first, then falls back to the first
/// clock-like or numeric token in the text ("about 12.5s", "at 1:30 into the
/// talk"). Unparseable text resolves to `0`.
pub fn coerce_seconds_str(s: &str) -> f64 {
    if let Ok(secs) = parse_timestamp(s) {
        return secs;
    }
    first_numeric_token(s).unwrap_or(0.0)
}

fn first_numeric_token(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let start = bytes.iter().position(|b| b.is_ascii_digit())?;
    let negative = start > 0 && bytes[start - 1] == b'-';

    let token: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ':')
        .collect();
    let token = token.trim_end_matches(|c| c == '.' || c == ':');

    let value = if token.contains(':') {
        parse_timestamp(token).ok()?
    } else {
        token.parse::<f64>().ok()?
    };

    Some(if negative { -value } else { value })
}

/// Serde adapter for `f64` second fields that tolerates model output.
pub mod lenient_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(*value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(super::coerce_seconds(&value))
    }
}

/// Serde adapter for optional second fields; `null` stays `None`.
pub mod lenient_seconds_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => None,
            other => Some(super::coerce_seconds(&other)),
        })
    }
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, MM:SS, or SS")]
    InvalidFormat(String),
}
