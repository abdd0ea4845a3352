//! Timestamp resolution for `DecisionRequest.timestamp` (spec.md §6).
//!
//! Accepts: absent (wall clock UTC), an RFC3339/ISO-8601 string (`Z` suffix or explicit
//! offset; a naive string with no offset is interpreted as UTC), a numeric Unix-seconds
//! value (int or float), or a numeric string. Any parse failure falls back to the wall
//! clock, matching `original_source`'s `parse_timestamp`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

pub fn resolve_timestamp(value: Option<&serde_json::Value>) -> DateTime<Utc> {
    match value {
        None => Utc::now(),
        Some(serde_json::Value::Null) => Utc::now(),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .and_then(from_unix_seconds)
            .unwrap_or_else(Utc::now),
        Some(serde_json::Value::String(s)) => parse_timestamp_str(s),
        Some(_) => Utc::now(),
    }
}

fn from_unix_seconds(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.trunc() as i64;
    let nanos = ((secs.fract()) * 1e9).round() as i64;
    Utc.timestamp_opt(whole, nanos.clamp(0, 999_999_999) as u32)
        .single()
}

fn parse_timestamp_str(raw: &str) -> DateTime<Utc> {
    let normalized = raw.replace('Z', "+00:00");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f") {
        return Utc.from_utc_datetime(&naive);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Utc.from_utc_datetime(&naive);
    }
    if let Ok(secs) = raw.parse::<f64>() {
        if let Some(dt) = from_unix_seconds(secs) {
            return dt;
        }
    }
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_defaults_to_now() {
        let before = Utc::now();
        let resolved = resolve_timestamp(None);
        assert!(resolved >= before);
    }

    #[test]
    fn parses_rfc3339_with_z_suffix() {
        let value = json!("2026-01-01T00:00:00Z");
        let resolved = resolve_timestamp(Some(&value));
        assert_eq!(resolved.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn parses_naive_string_as_utc() {
        let value = json!("2026-01-01T00:00:00");
        let resolved = resolve_timestamp(Some(&value));
        assert_eq!(resolved.timezone(), Utc);
        assert_eq!(resolved.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn parses_numeric_unix_seconds() {
        let value = json!(0);
        let resolved = resolve_timestamp(Some(&value));
        assert_eq!(resolved.timestamp(), 0);
    }

    #[test]
    fn parses_numeric_string() {
        let value = json!("1700000000");
        let resolved = resolve_timestamp(Some(&value));
        assert_eq!(resolved.timestamp(), 1_700_000_000);
    }

    #[test]
    fn unparsable_string_falls_back_to_now() {
        let before = Utc::now();
        let value = json!("not a timestamp");
        let resolved = resolve_timestamp(Some(&value));
        assert!(resolved >= before);
    }
}
