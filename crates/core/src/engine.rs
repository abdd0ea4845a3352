//! Top-level orchestration: wires the buffer, forecaster, and state store together and
//! implements the three response branches of spec.md §4.6–§4.7.

use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;

use crate::buffer::TimeSeriesBuffer;
use crate::config::EngineConfig;
use crate::forecast::Forecaster;
use crate::policy::{self, clamp, round3};
use crate::state::EngineState;
use crate::timestamp;
use crate::types::{parse_decision_request, DecisionRequest, Outcome, Recommendation};
use crate::validate;

/// Everything one `POST /v1/limit-config` response needs beyond the JSON body: the
/// metric-relevant facts the server layer publishes to the gauges/counters/histogram of
/// spec.md §6. `None` on `observed_rps` / `predicted_rps` means "unknown" (the caller
/// should publish NaN, per spec.md §9), not zero.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub outcome: Outcome,
    pub recommendation: Recommendation,
    pub observed_rps: Option<f64>,
    pub predicted_rps: Option<f64>,
    pub history_points: usize,
    pub forecast_duration_seconds: Option<f64>,
}

/// The process-global engine: one instance per server, shared across request-handling
/// threads behind `Arc`.
pub struct Engine {
    config: EngineConfig,
    buffer: TimeSeriesBuffer,
    forecaster: Forecaster,
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let buffer = TimeSeriesBuffer::new(config.history_window_seconds, config.max_history_points);
        Self {
            buffer,
            forecaster: Forecaster::new(),
            state: Mutex::new(EngineState::default()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decides a response for a raw request body. Never fails: any parse or validation
    /// failure is absorbed into one of the fallback branches, per spec.md §4.7's
    /// guiding principle that a usable recommendation always beats an error.
    pub fn decide(&self, body: &[u8]) -> DecisionOutcome {
        let raw_value: Option<serde_json::Value> = serde_json::from_slice(body).ok();
        let request = raw_value.as_ref().and_then(|v| parse_decision_request(v).ok());

        match request {
            Some(request) => self.handle_structural_request(request),
            None => self.handle_malformed_body(raw_value.as_ref()),
        }
    }

    fn handle_structural_request(&self, request: DecisionRequest) -> DecisionOutcome {
        let ts = timestamp::resolve_timestamp(request.timestamp.as_ref());
        self.buffer.append(ts, request.observed_rps);
        let snapshot = self.buffer.snapshot();

        let forecast_start = Instant::now();
        let predicted = self.forecaster.forecast(&snapshot, &self.config);
        let forecast_duration = forecast_start.elapsed().as_secs_f64();

        let predicted_raw = predicted.unwrap_or(request.observed_rps);
        let predicted_clamped = clamp(predicted_raw, 0.0, self.config.max_rps());
        let predicted_rps = round3(predicted_clamped);

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.last_predicted_rps = Some(predicted_rps);
        }

        if let Err(reason) = validate::validate_current_config(&request.current_config) {
            tracing::warn!(
                reason = %reason,
                "currentConfig failed semantic validation, using keep-current fallback"
            );
            return self.invalid_config_response(predicted_rps, snapshot.len(), request.observed_rps, forecast_duration);
        }

        let now = Utc::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let recommendation = policy::decide(&request, predicted_clamped, &snapshot, &mut state, now, &self.config);

        state.last_good_config = Some(request.current_config.clone());
        state.last_good_recommendation = Some(recommendation.clone());
        drop(state);

        DecisionOutcome {
            outcome: Outcome::Ok,
            recommendation,
            observed_rps: Some(request.observed_rps),
            predicted_rps: Some(predicted_rps),
            history_points: snapshot.len(),
            forecast_duration_seconds: Some(forecast_duration),
        }
    }

    fn invalid_config_response(
        &self,
        predicted_rps: f64,
        history_points: usize,
        observed_rps: f64,
        forecast_duration: f64,
    ) -> DecisionOutcome {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let base = state
            .last_good_config
            .clone()
            .unwrap_or_else(|| validate::default_fallback_config(&self.config));
        drop(state);

        let recommendation = policy::build_response(
            &base.algorithm,
            policy::current_rps_limit(&base),
            &base,
            Some(predicted_rps),
            &self.config,
        );

        DecisionOutcome {
            outcome: Outcome::InvalidConfig,
            recommendation,
            observed_rps: Some(observed_rps),
            predicted_rps: Some(predicted_rps),
            history_points,
            forecast_duration_seconds: Some(forecast_duration),
        }
    }

    /// §4.7's malformed-body branch: the body never parsed into a `DecisionRequest`, so
    /// no telemetry was ingested and no forecast was run this request — everything here
    /// is reconstructed from prior state.
    fn handle_malformed_body(&self, raw_value: Option<&serde_json::Value>) -> DecisionOutcome {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let last_predicted = state.last_predicted_rps;

        let recommendation = if let Some(coerced) =
            validate::coerce_from_raw(raw_value, state.last_good_config.as_ref())
        {
            policy::build_response(
                &coerced.algorithm,
                policy::current_rps_limit(&coerced),
                &coerced,
                last_predicted,
                &self.config,
            )
        } else if let Some(replay) = state.last_good_recommendation.clone() {
            replay
        } else {
            let fallback = validate::default_fallback_config(&self.config);
            policy::build_response(
                &fallback.algorithm,
                policy::current_rps_limit(&fallback),
                &fallback,
                last_predicted,
                &self.config,
            )
        };
        drop(state);

        DecisionOutcome {
            outcome: Outcome::ValidationError,
            recommendation,
            observed_rps: None,
            predicted_rps: last_predicted,
            history_points: self.buffer.len(),
            forecast_duration_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Algorithm;

    fn body(json: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json).unwrap()
    }

    #[test]
    fn steady_state_echoes_config_twenty_times() {
        let engine = Engine::new(EngineConfig::default());
        for _ in 0..20 {
            let req = body(serde_json::json!({
                "observedRps": 100.0,
                "currentConfig": {"algorithm": "fixed", "limit": 120, "window": 1}
            }));
            let outcome = engine.decide(&req);
            assert_eq!(outcome.outcome, Outcome::Ok);
            assert_eq!(outcome.recommendation.limit, Some(120));
            assert_eq!(outcome.recommendation.window, Some(1));
        }
    }

    #[test]
    fn invalid_config_falls_back_to_default() {
        let engine = Engine::new(EngineConfig::default());
        let req = body(serde_json::json!({
            "observedRps": 50.0,
            "currentConfig": {"algorithm": "sliding", "limit": 0, "window": 1}
        }));
        let outcome = engine.decide(&req);
        assert_eq!(outcome.outcome, Outcome::InvalidConfig);
        assert_eq!(outcome.recommendation.algorithm, Algorithm::Fixed);
        assert_eq!(outcome.recommendation.limit, Some(60));
        assert_eq!(outcome.recommendation.window, Some(60));
    }

    #[test]
    fn invalid_config_falls_back_to_last_good_config_when_set() {
        let engine = Engine::new(EngineConfig::default());
        let good = body(serde_json::json!({
            "observedRps": 100.0,
            "currentConfig": {"algorithm": "fixed", "limit": 120, "window": 1}
        }));
        engine.decide(&good);

        let bad = body(serde_json::json!({
            "observedRps": 50.0,
            "currentConfig": {"algorithm": "sliding", "limit": 0, "window": 1}
        }));
        let outcome = engine.decide(&bad);
        assert_eq!(outcome.outcome, Outcome::InvalidConfig);
        assert_eq!(outcome.recommendation.limit, Some(120));
    }

    #[test]
    fn invalid_config_response_still_publishes_last_predicted_rps() {
        let engine = Engine::new(EngineConfig::default());
        let good = body(serde_json::json!({
            "observedRps": 100.0,
            "currentConfig": {"algorithm": "fixed", "limit": 120, "window": 1}
        }));
        engine.decide(&good);

        let invalid = body(serde_json::json!({
            "observedRps": 500.0,
            "currentConfig": {"algorithm": "sliding", "limit": 0, "window": 1}
        }));
        let outcome = engine.decide(&invalid);
        assert_eq!(outcome.outcome, Outcome::InvalidConfig);
        let published = outcome.predicted_rps.expect("forecast published on invalid-config path");
        assert_ne!(published, 100.0, "should reflect this request's forecast, not the stale one");

        // A subsequent coercible malformed body must see the forecast the
        // invalid-config response just published, not the stale one from `good`.
        let coercible = body(serde_json::json!({
            "observedRps": "nope",
            "currentConfig": {"algorithm": "fixed", "limit": 200}
        }));
        let replayed = engine.decide(&coercible);
        assert_eq!(replayed.outcome, Outcome::ValidationError);
        assert_eq!(replayed.predicted_rps, Some(published));
    }

    #[test]
    fn malformed_body_replays_last_good_recommendation() {
        let engine = Engine::new(EngineConfig::default());
        let good = body(serde_json::json!({
            "observedRps": 100.0,
            "currentConfig": {"algorithm": "fixed", "limit": 120, "window": 1}
        }));
        let first = engine.decide(&good);

        let garbage = body(serde_json::json!({"garbage": true}));
        let outcome = engine.decide(&garbage);
        assert_eq!(outcome.outcome, Outcome::ValidationError);
        assert_eq!(outcome.recommendation, first.recommendation);
        assert_eq!(outcome.observed_rps, None);
    }

    #[test]
    fn malformed_body_without_any_history_uses_default_fallback() {
        let engine = Engine::new(EngineConfig::default());
        let garbage = body(serde_json::json!({"garbage": true}));
        let outcome = engine.decide(&garbage);
        assert_eq!(outcome.outcome, Outcome::ValidationError);
        assert_eq!(outcome.recommendation.algorithm, Algorithm::Fixed);
        assert_eq!(outcome.recommendation.limit, Some(60));
        assert_eq!(outcome.predicted_rps, None);
    }

    #[test]
    fn malformed_body_coerces_partial_current_config() {
        let engine = Engine::new(EngineConfig::default());
        let good = body(serde_json::json!({
            "observedRps": 100.0,
            "currentConfig": {"algorithm": "fixed", "limit": 120, "window": 1}
        }));
        engine.decide(&good);

        let partial = body(serde_json::json!({
            "currentConfig": {"algorithm": "fixed", "limit": 150}
        }));
        let outcome = engine.decide(&partial);
        assert_eq!(outcome.outcome, Outcome::ValidationError);
        assert_eq!(outcome.recommendation.limit, Some(150));
        assert_eq!(outcome.recommendation.window, Some(1));
    }

    #[test]
    fn round_trip_idempotence_at_stable_point() {
        let engine = Engine::new(EngineConfig::default());
        let req = body(serde_json::json!({
            "observedRps": 100.0,
            "currentConfig": {"algorithm": "fixed", "limit": 120, "window": 1}
        }));
        let first = engine.decide(&req);
        let replayed = body(serde_json::json!({
            "observedRps": 100.0,
            "currentConfig": serde_json::to_value(&first.recommendation).unwrap()
        }));
        let second = engine.decide(&replayed);
        assert_eq!(second.recommendation, first.recommendation);
    }

    #[test]
    fn history_points_reflects_buffer_length_even_on_malformed_body() {
        let engine = Engine::new(EngineConfig::default());
        let req = body(serde_json::json!({
            "observedRps": 100.0,
            "currentConfig": {"algorithm": "fixed", "limit": 120, "window": 1}
        }));
        engine.decide(&req);
        let garbage = body(serde_json::json!({"garbage": true}));
        let outcome = engine.decide(&garbage);
        assert_eq!(outcome.history_points, 1);
    }
}
