//! Horizon-ahead RPS forecasting (spec.md §4.2).
//!
//! `Forecaster::forecast` never mutates its input and never fails: a model-internal
//! error demotes to the linear-extrapolation fallback and is only observable through a
//! `tracing::warn!` log, exactly as `original_source`'s `except Exception` around the
//! Prophet call does.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::types::TimePoint;

/// A pluggable forecasting backend. Implementations may fail (model fit error, empty
/// input) — the caller always has the linear fallback to fall back to.
pub trait ForecastModel: Send + Sync {
    fn fit_predict(&self, points: &[TimePoint], horizon_secs: i64) -> Result<f64, EngineError>;
}

/// Linear extrapolation over the trailing `fallback_window_points` samples. Always
/// compiled in; this is the forecaster's floor, not an optional extra.
#[derive(Debug, Default)]
pub struct FallbackModel;

impl ForecastModel for FallbackModel {
    fn fit_predict(&self, points: &[TimePoint], horizon_secs: i64) -> Result<f64, EngineError> {
        Ok(linear_extrapolate(points, points.len(), horizon_secs))
    }
}

fn linear_extrapolate(points: &[TimePoint], window: usize, horizon_secs: i64) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let k = window.min(points.len()).max(1);
    let tail = &points[points.len() - k..];
    if tail.len() == 1 {
        return tail[0].rps;
    }
    let start = tail.first().unwrap();
    let end = tail.last().unwrap();
    let span = (end.ts - start.ts).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0;
    if span <= 0.0 {
        return end.rps;
    }
    let slope = (end.rps - start.rps) / span;
    (end.rps + slope * horizon_secs as f64).max(0.0)
}

/// External time-series model, compiled only behind the `prophet_model` feature. This
/// is the stand-in for the Python reference's optional `prophet` dependency: the
/// reference degrades to linear extrapolation when `prophet` isn't importable, and this
/// repo makes that degradation the default build, with the richer model opt-in. See
/// DESIGN.md for the rationale.
#[cfg(feature = "prophet_model")]
pub struct ExternalModel;

#[cfg(feature = "prophet_model")]
impl ForecastModel for ExternalModel {
    fn fit_predict(&self, points: &[TimePoint], horizon_secs: i64) -> Result<f64, EngineError> {
        use augurs::ets::AutoETS;
        use augurs::forecaster::Forecaster as AugursForecaster;

        let y: Vec<f64> = points.iter().map(|p| p.rps).collect();
        let model = AutoETS::non_seasonal()
            .into_trend_model()
            .map_err(|e| EngineError::Forecaster(e.to_string()))?;
        let mut forecaster = AugursForecaster::new(model);
        forecaster
            .fit(&y)
            .map_err(|e| EngineError::Forecaster(e.to_string()))?;
        let forecast = forecaster
            .predict(1, None)
            .map_err(|e| EngineError::Forecaster(e.to_string()))?;
        let predicted = forecast
            .point
            .first()
            .copied()
            .ok_or_else(|| EngineError::Forecaster("empty forecast".to_string()))?;
        let _ = horizon_secs;
        Ok(predicted.max(0.0))
    }
}

/// Selects between the external model (when compiled in and enough history exists) and
/// the linear fallback, per spec.md §4.2.
pub struct Forecaster {
    #[cfg(feature = "prophet_model")]
    external: ExternalModel,
    fallback: FallbackModel,
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Forecaster {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "prophet_model")]
            external: ExternalModel,
            fallback: FallbackModel,
        }
    }

    /// Returns `None` only when `points` is empty; otherwise always returns a
    /// non-negative prediction.
    pub fn forecast(&self, points: &[TimePoint], config: &EngineConfig) -> Option<f64> {
        if points.is_empty() {
            return None;
        }

        #[cfg(feature = "prophet_model")]
        {
            if points.len() >= config.min_history_points {
                match self.external.fit_predict(points, config.forecast_seconds) {
                    Ok(predicted) => return Some(predicted),
                    Err(err) => {
                        tracing::warn!(error = %err, "external forecast model failed, demoting to fallback");
                    }
                }
            }
        }

        let window = config.fallback_window_points;
        Some(linear_extrapolate(points, window, config.forecast_seconds).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn points(rps: &[f64]) -> Vec<TimePoint> {
        rps.iter()
            .enumerate()
            .map(|(i, v)| TimePoint::new(ts(i as i64), *v))
            .collect()
    }

    #[test]
    fn empty_points_returns_none() {
        let forecaster = Forecaster::new();
        let config = EngineConfig::default();
        assert_eq!(forecaster.forecast(&[], &config), None);
    }

    #[test]
    fn single_point_returns_its_value() {
        let forecaster = Forecaster::new();
        let config = EngineConfig::default();
        let pts = points(&[42.0]);
        assert_eq!(forecaster.forecast(&pts, &config), Some(42.0));
    }

    #[test]
    fn flat_series_extrapolates_flat() {
        let forecaster = Forecaster::new();
        let config = EngineConfig::default();
        let pts = points(&[100.0; 10]);
        let predicted = forecaster.forecast(&pts, &config).unwrap();
        assert!((predicted - 100.0).abs() < 1e-6);
    }

    #[test]
    fn rising_series_extrapolates_upward() {
        let forecaster = Forecaster::new();
        let mut config = EngineConfig::default();
        config.forecast_seconds = 60;
        let pts = points(&[0.0, 10.0, 20.0, 30.0, 40.0]);
        let predicted = forecaster.forecast(&pts, &config).unwrap();
        // slope = 10 rps/sec over the tail window, so +60s should predict well above 40.
        assert!(predicted > 40.0);
    }

    #[test]
    fn never_predicts_negative() {
        let forecaster = Forecaster::new();
        let config = EngineConfig::default();
        let pts = points(&[10.0, 0.0]);
        let predicted = forecaster.forecast(&pts, &config).unwrap();
        assert!(predicted >= 0.0);
    }

    #[test]
    fn zero_span_window_returns_last_value() {
        let forecaster = Forecaster::new();
        let config = EngineConfig::default();
        let same_ts = ts(5);
        let pts = vec![TimePoint::new(same_ts, 3.0), TimePoint::new(same_ts, 7.0)];
        assert_eq!(forecaster.forecast(&pts, &config), Some(7.0));
    }
}
