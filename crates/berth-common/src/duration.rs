//! Duration parsing for operation timeouts.
//!
//! Supports compact Go-style duration strings:
//! - "20m" -> 20 minutes
//! - "1h30m" -> 90 minutes
//! - "45s", "500ms"
//! - "90" -> 90 seconds

use std::time::Duration;

use crate::error::{BerthError, BerthResult};

/// Parse a duration string.
///
/// # Errors
///
/// Returns [`BerthError::InvalidDuration`] for empty input, unknown units,
/// or components that do not parse as unsigned integers.
pub fn parse_duration(s: &str) -> BerthResult<Duration> {
    let s = s.trim();
    let invalid = || BerthError::InvalidDuration {
        value: s.to_string(),
    };

    if s.is_empty() {
        return Err(invalid());
    }

    // Bare number means seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let component = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            _ => return Err(invalid()),
        };
        total += component;
        rest = &rest[unit_len..];
    }

    Ok(total)
}

/// Format a duration in the compact form accepted by [`parse_duration`].
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() != 0 {
        return format!("{}ms", duration.as_millis());
    }

    let secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 {
        out.push_str(&format!("{s}s"));
    }
    out
}

/// Serde adapter for durations written as compact strings or bare seconds.
///
/// ```ignore
/// #[serde(with = "berth_common::duration::human")]
/// create: Duration,
/// ```
pub mod human {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Seconds(u64),
        Text(String),
    }

    /// Serialize as a compact duration string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    /// Deserialize from a compact duration string or a number of seconds.
    ///
    /// # Errors
    ///
    /// Fails if the value is neither an unsigned integer nor a valid duration string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Repr::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units() {
        assert_eq!(parse_duration("20m").unwrap(), Duration::from_secs(1200));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 90 ").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn parse_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("10").is_ok());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("1h-5m").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[test]
    fn format_compact() {
        assert_eq!(format_duration(Duration::from_secs(1200)), "20m");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1m1s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    proptest::proptest! {
        #[test]
        fn format_parses_back(secs in 0u64..1_000_000) {
            let d = Duration::from_secs(secs);
            proptest::prop_assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }
}
