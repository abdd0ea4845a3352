//! Validation and best-effort coercion of `currentConfig` (spec.md §4.3).

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::types::{Algorithm, IncomingConfig};

/// Returns `Err(EngineError::Config(reason))` when `cfg` fails semantic validation;
/// `Ok(())` when clean.
pub fn validate_current_config(cfg: &IncomingConfig) -> Result<(), EngineError> {
    match cfg.algorithm {
        Algorithm::Fixed | Algorithm::Sliding => {
            let limit = cfg
                .limit
                .ok_or_else(|| EngineError::Config("limit is required for fixed/sliding".to_string()))?;
            let window = cfg
                .window
                .ok_or_else(|| EngineError::Config("window is required for fixed/sliding".to_string()))?;
            if limit <= 0.0 || window <= 0 {
                return Err(EngineError::Config(
                    "limit and window must be positive".to_string(),
                ));
            }
        }
        Algorithm::Token => {
            let capacity = cfg
                .capacity
                .ok_or_else(|| EngineError::Config("capacity is required for token".to_string()))?;
            let fill_rate = cfg
                .fill_rate
                .ok_or_else(|| EngineError::Config("fillRate is required for token".to_string()))?;
            if capacity <= 0 || fill_rate <= 0.0 {
                return Err(EngineError::Config(
                    "capacity and fillRate must be positive".to_string(),
                ));
            }
        }
        Algorithm::Unknown(ref name) => {
            return Err(EngineError::Config(format!("unsupported algorithm: {name}")));
        }
    }
    Ok(())
}

/// Best-effort reconstruction of an `IncomingConfig` from a raw, possibly malformed
/// request payload, used on the malformed-body branch (spec.md §4.7).
///
/// Merges `payload.currentConfig`'s non-null fields over `fallback`'s non-null fields
/// (incoming wins), then accepts the merge only if it both parses and validates;
/// otherwise returns `fallback` unchanged (which may itself be `None`).
pub fn coerce_current_config(
    payload: Option<&serde_json::Value>,
    fallback: Option<&IncomingConfig>,
) -> Option<IncomingConfig> {
    coerce_from_raw(payload, fallback).or_else(|| fallback.cloned())
}

/// Like `coerce_current_config`, but returns `None` instead of falling back when the raw
/// payload has no `currentConfig` that both merges and validates — used by the
/// malformed-body branch (spec.md §4.7) to distinguish "a config was actually producible
/// from this request" from "nothing better than the fallback is available".
pub fn coerce_from_raw(
    payload: Option<&serde_json::Value>,
    fallback: Option<&IncomingConfig>,
) -> Option<IncomingConfig> {
    let raw_config = payload
        .and_then(|v| v.as_object())
        .and_then(|obj| obj.get("currentConfig"))
        .and_then(|v| v.as_object())?;

    let merged = IncomingConfig::overlay_onto(raw_config, fallback);
    if merged.is_empty() {
        return None;
    }

    let candidate: IncomingConfig =
        serde_json::from_value(serde_json::Value::Object(merged)).ok()?;
    validate_current_config(&candidate).ok()?;
    Some(candidate)
}

/// Synthesizes a `fixed` config guaranteed to pass `validate_current_config`, widening
/// the window if `MaxRps` would otherwise force the limit below 1 (spec.md §4.3).
pub fn default_fallback_config(config: &EngineConfig) -> IncomingConfig {
    let mut window = config.default_window_seconds.max(1);
    let mut limit = ((config.min_rps * window as f64).ceil() as i64).max(1);

    if let Some(max_rps) = config.max_rps() {
        let mut max_limit = (max_rps * window as f64).floor() as i64;
        if max_limit < 1 {
            window = window.max(((1.0 / max_rps).ceil() as i64).max(1));
            max_limit = (max_rps * window as f64).floor() as i64;
        }
        if max_limit >= 1 {
            limit = limit.min(max_limit);
        }
        limit = limit.max(1);
    }

    IncomingConfig::fixed(limit, window)
}
