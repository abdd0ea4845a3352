//! Wire-adjacent data model: algorithms, configs, requests and recommendations.
//!
//! `IncomingConfig` is deliberately flat (one struct with all four algorithm-dependent
//! fields optional) rather than a Rust enum per algorithm, because the validator needs
//! to merge partial, possibly-invalid configs field-by-field during coercion (§4.3) —
//! an enum would force a round-trip through the flat shape anyway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single point in the observed-RPS time series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    pub ts: DateTime<Utc>,
    pub rps: f64,
}

impl TimePoint {
    pub fn new(ts: DateTime<Utc>, rps: f64) -> Self {
        Self { ts, rps }
    }
}

/// Rate-limiting algorithm family. `Unknown` preserves whatever string the caller sent
/// so `validate_current_config` can report it, rather than rejecting it at parse time —
/// an unrecognized algorithm is a *semantic* validation failure, not a structural one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Algorithm {
    Fixed,
    Sliding,
    Token,
    Unknown(String),
}

impl Algorithm {
    pub fn as_str(&self) -> &str {
        match self {
            Algorithm::Fixed => "fixed",
            Algorithm::Sliding => "sliding",
            Algorithm::Token => "token",
            Algorithm::Unknown(raw) => raw,
        }
    }

    fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fixed" => Algorithm::Fixed,
            "sliding" => Algorithm::Sliding,
            "token" | "token_bucket" | "tokenbucket" => Algorithm::Token,
            other => Algorithm::Unknown(other.to_string()),
        }
    }
}

impl Serialize for Algorithm {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Algorithm::normalize(&raw))
    }
}

/// The limiter configuration as reported by the client, or as recommended back to it.
///
/// `limit` mirrors the Python reference's `Optional[float]` on the request side (callers
/// are not required to send a whole number); `window` and `capacity` are whole seconds /
/// token counts. Fields irrelevant to `algorithm` are simply `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingConfig {
    pub algorithm: Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
    #[serde(
        default,
        rename = "fillRate",
        skip_serializing_if = "Option::is_none"
    )]
    pub fill_rate: Option<f64>,
}

impl IncomingConfig {
    pub fn fixed(limit: i64, window: i64) -> Self {
        Self {
            algorithm: Algorithm::Fixed,
            limit: Some(limit as f64),
            window: Some(window),
            capacity: None,
            fill_rate: None,
        }
    }

    /// Merge `self` (the non-null fields of a raw override) over `other`, the override
    /// taking precedence — mirrors `original_source`'s `merged.update(fallback); merged
    /// overlaid with raw_config`.
    pub fn overlay_onto(raw: &serde_json::Map<String, serde_json::Value>, base: Option<&IncomingConfig>) -> serde_json::Map<String, serde_json::Value> {
        let mut merged = match base {
            Some(cfg) => match serde_json::to_value(cfg) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            },
            None => serde_json::Map::new(),
        };
        for (key, value) in raw {
            if !value.is_null() {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// The request body for `POST /v1/limit-config`. `timestamp` is kept as the raw JSON
/// value because its shape is polymorphic (absent / string / number) and resolving it
/// to a concrete instant is the timestamp module's job, not serde's.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub timestamp: Option<serde_json::Value>,
    pub observed_rps: f64,
    pub rejected_rate: Option<f64>,
    pub latency_p95: Option<f64>,
    pub errors_5xx: Option<i64>,
    pub current_config: IncomingConfig,
}

#[derive(Debug, Deserialize)]
struct DecisionRequestWire {
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(rename = "observedRps")]
    observed_rps: f64,
    #[serde(default, rename = "rejectedRate")]
    rejected_rate: Option<f64>,
    #[serde(default, rename = "latencyP95")]
    latency_p95: Option<f64>,
    #[serde(default, rename = "errors5xx")]
    errors_5xx: Option<i64>,
    #[serde(rename = "currentConfig")]
    current_config: IncomingConfig,
}

/// Parses and range-checks a decision request from an already-JSON-decoded body.
///
/// Range checks (`observedRps >= 0`, `rejectedRate` in `[0, 1]`, `latencyP95 >= 0`,
/// `errors5xx >= 0`) are part of *structural* validation here, matching the Python
/// reference's pydantic `Field(ge=..., le=...)` constraints: a violation is a
/// `SchemaError`, which routes to the malformed-body branch, not the invalid-config one.
pub fn parse_decision_request(payload: &serde_json::Value) -> Result<DecisionRequest, crate::error::EngineError> {
    let wire: DecisionRequestWire = serde_json::from_value(payload.clone())
        .map_err(|e| crate::error::EngineError::Schema(e.to_string()))?;

    if wire.observed_rps < 0.0 {
        return Err(crate::error::EngineError::Schema(
            "observedRps must be >= 0".to_string(),
        ));
    }
    if let Some(r) = wire.rejected_rate {
        if !(0.0..=1.0).contains(&r) {
            return Err(crate::error::EngineError::Schema(
                "rejectedRate must be in [0, 1]".to_string(),
            ));
        }
    }
    if let Some(l) = wire.latency_p95 {
        if l < 0.0 {
            return Err(crate::error::EngineError::Schema(
                "latencyP95 must be >= 0".to_string(),
            ));
        }
    }
    if let Some(e) = wire.errors_5xx {
        if e < 0 {
            return Err(crate::error::EngineError::Schema(
                "errors5xx must be >= 0".to_string(),
            ));
        }
    }

    Ok(DecisionRequest {
        timestamp: wire.timestamp,
        observed_rps: wire.observed_rps,
        rejected_rate: wire.rejected_rate,
        latency_p95: wire.latency_p95,
        errors_5xx: wire.errors_5xx,
        current_config: wire.current_config,
    })
}

/// The response body for `POST /v1/limit-config`. Same shape as `IncomingConfig` plus
/// the two forecast-derived fields; `None` fields are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub algorithm: Algorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
    #[serde(rename = "fillRate", skip_serializing_if = "Option::is_none")]
    pub fill_rate: Option<f64>,
    #[serde(rename = "predictedRps", skip_serializing_if = "Option::is_none")]
    pub predicted_rps: Option<f64>,
    #[serde(rename = "validFor", skip_serializing_if = "Option::is_none")]
    pub valid_for: Option<i64>,
}

impl Recommendation {
    /// The RPS rate this recommendation implies, used to populate
    /// `ai_last_recommended_rps`. `None` if the shape is incomplete (shouldn't happen
    /// for a config that passed `build_response`, but gauges must never panic).
    pub fn implied_rps(&self) -> Option<f64> {
        match self.algorithm {
            Algorithm::Fixed | Algorithm::Sliding => {
                let window = self.window.filter(|w| *w != 0)?;
                self.limit.map(|l| l as f64 / window as f64)
            }
            Algorithm::Token => self.fill_rate,
            Algorithm::Unknown(_) => None,
        }
    }
}

/// Outcome tag used both for the `result` metric label and to pick the response path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    InvalidConfig,
    ValidationError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::InvalidConfig => "invalid_config",
            Outcome::ValidationError => "validation_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_normalizes_aliases() {
        assert_eq!(Algorithm::normalize("token_bucket"), Algorithm::Token);
        assert_eq!(Algorithm::normalize("tokenbucket"), Algorithm::Token);
        assert_eq!(Algorithm::normalize("  Fixed "), Algorithm::Fixed);
        assert_eq!(
            Algorithm::normalize("leaky"),
            Algorithm::Unknown("leaky".to_string())
        );
    }

    #[test]
    fn parse_decision_request_rejects_negative_observed_rps() {
        let payload = serde_json::json!({
            "observedRps": -1.0,
            "currentConfig": {"algorithm": "fixed", "limit": 10, "window": 1}
        });
        assert!(parse_decision_request(&payload).is_err());
    }

    #[test]
    fn parse_decision_request_rejects_out_of_range_rejected_rate() {
        let payload = serde_json::json!({
            "observedRps": 1.0,
            "rejectedRate": 1.5,
            "currentConfig": {"algorithm": "fixed", "limit": 10, "window": 1}
        });
        assert!(parse_decision_request(&payload).is_err());
    }

    #[test]
    fn parse_decision_request_happy_path() {
        let payload = serde_json::json!({
            "observedRps": 100.0,
            "currentConfig": {"algorithm": "token_bucket", "capacity": 10, "fillRate": 5.0}
        });
        let req = parse_decision_request(&payload).unwrap();
        assert_eq!(req.current_config.algorithm, Algorithm::Token);
    }

    #[test]
    fn recommendation_serializes_without_none_fields() {
        let rec = Recommendation {
            algorithm: Algorithm::Fixed,
            limit: Some(10),
            window: Some(1),
            capacity: None,
            fill_rate: None,
            predicted_rps: Some(1.5),
            valid_for: Some(60),
        };
        let value = serde_json::to_value(&rec).unwrap();
        assert!(value.get("capacity").is_none());
        assert!(value.get("fillRate").is_none());
        assert_eq!(value["limit"], 10);
    }

    #[test]
    fn implied_rps_for_token() {
        let rec = Recommendation {
            algorithm: Algorithm::Token,
            limit: None,
            window: None,
            capacity: Some(10),
            fill_rate: Some(5.0),
            predicted_rps: None,
            valid_for: None,
        };
        assert_eq!(rec.implied_rps(), Some(5.0));
    }
}
