//! The fixed metric surface of spec.md §6: names and semantics are part of the contract,
//! so every name here is copied verbatim from the spec rather than derived.

use miette::{IntoDiagnostic, Result};
use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use ratelimit_advisor_core::engine::DecisionOutcome;
use ratelimit_advisor_core::types::Algorithm;

pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    forecast_duration_seconds: Histogram,
    last_observed_rps: Gauge,
    last_predicted_rps: Gauge,
    last_recommended_rps: Gauge,
    last_recommended_limit: Gauge,
    last_recommended_window_seconds: Gauge,
    last_recommended_capacity: Gauge,
    last_recommended_fill_rate: Gauge,
    last_valid_for_seconds: Gauge,
    history_points: Gauge,
    last_algorithm: GaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "ai_limit_config_requests_total",
                "Decisions served by POST /v1/limit-config, by result",
            ),
            &["result"],
        )
        .into_diagnostic()?;
        let forecast_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "ai_forecast_duration_seconds",
            "Wall-clock time spent inside the forecaster",
        ))
        .into_diagnostic()?;
        let last_observed_rps = Gauge::new(
            "ai_last_observed_rps",
            "Observed RPS reported by the most recent request with known telemetry",
        )
        .into_diagnostic()?;
        let last_predicted_rps = Gauge::new(
            "ai_last_predicted_rps",
            "Forecast RPS published by the most recent decision",
        )
        .into_diagnostic()?;
        let last_recommended_rps = Gauge::new(
            "ai_last_recommended_rps",
            "RPS rate implied by the most recent recommendation",
        )
        .into_diagnostic()?;
        let last_recommended_limit =
            Gauge::new("ai_last_recommended_limit", "Most recent recommended limit")
                .into_diagnostic()?;
        let last_recommended_window_seconds = Gauge::new(
            "ai_last_recommended_window_seconds",
            "Most recent recommended window, in seconds",
        )
        .into_diagnostic()?;
        let last_recommended_capacity = Gauge::new(
            "ai_last_recommended_capacity",
            "Most recent recommended token bucket capacity",
        )
        .into_diagnostic()?;
        let last_recommended_fill_rate = Gauge::new(
            "ai_last_recommended_fill_rate",
            "Most recent recommended token bucket fill rate",
        )
        .into_diagnostic()?;
        let last_valid_for_seconds = Gauge::new(
            "ai_last_valid_for_seconds",
            "validFor of the most recent recommendation, in seconds",
        )
        .into_diagnostic()?;
        let history_points =
            Gauge::new("ai_history_points", "Current length of the time-series buffer")
                .into_diagnostic()?;
        let last_algorithm = GaugeVec::new(
            Opts::new(
                "ai_last_algorithm",
                "1.0 for the algorithm family of the most recent recommendation, 0.0 otherwise",
            ),
            &["algorithm"],
        )
        .into_diagnostic()?;

        registry
            .register(Box::new(requests_total.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(forecast_duration_seconds.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_observed_rps.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_predicted_rps.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_recommended_rps.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_recommended_limit.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_recommended_window_seconds.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_recommended_capacity.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_recommended_fill_rate.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_valid_for_seconds.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(history_points.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(last_algorithm.clone()))
            .into_diagnostic()?;

        Ok(Self {
            registry,
            requests_total,
            forecast_duration_seconds,
            last_observed_rps,
            last_predicted_rps,
            last_recommended_rps,
            last_recommended_limit,
            last_recommended_window_seconds,
            last_recommended_capacity,
            last_recommended_fill_rate,
            last_valid_for_seconds,
            history_points,
            last_algorithm,
        })
    }

    /// Renders the registry in Prometheus text exposition format, for `GET /metrics`.
    pub fn render(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        let _ = encoder.encode(&families, &mut buffer);
        buffer
    }

    /// Updates every gauge/counter/histogram from one decision outcome. `NaN` is
    /// published only for `observedRps`/`predictedRps` when this outcome truly doesn't
    /// know them (spec.md §9's validation-error case); a field that's simply inapplicable
    /// to the recommended algorithm (e.g. `capacity`/`fillRate` for `fixed`/`sliding`)
    /// publishes `0.0` in every outcome, matching `original_source`'s
    /// `update_metrics`/`update_metrics_from_response`.
    pub fn record(&self, outcome: &DecisionOutcome) {
        self.requests_total
            .with_label_values(&[outcome.outcome.as_str()])
            .inc();

        if let Some(duration) = outcome.forecast_duration_seconds {
            self.forecast_duration_seconds.observe(duration);
        }

        self.last_observed_rps
            .set(outcome.observed_rps.unwrap_or(f64::NAN));
        self.last_predicted_rps
            .set(outcome.predicted_rps.unwrap_or(f64::NAN));
        self.history_points.set(outcome.history_points as f64);

        let rec = &outcome.recommendation;
        self.last_recommended_rps
            .set(rec.implied_rps().unwrap_or(f64::NAN));
        self.last_recommended_limit
            .set(rec.limit.map(|v| v as f64).unwrap_or(0.0));
        self.last_recommended_window_seconds
            .set(rec.window.map(|v| v as f64).unwrap_or(0.0));
        self.last_recommended_capacity
            .set(rec.capacity.map(|v| v as f64).unwrap_or(0.0));
        self.last_recommended_fill_rate
            .set(rec.fill_rate.unwrap_or(0.0));
        self.last_valid_for_seconds
            .set(rec.valid_for.map(|v| v as f64).unwrap_or(0.0));

        self.update_algorithm_gauge(&rec.algorithm);
    }

    fn update_algorithm_gauge(&self, algorithm: &Algorithm) {
        for name in ["fixed", "sliding", "token"] {
            self.last_algorithm.with_label_values(&[name]).set(0.0);
        }
        self.last_algorithm
            .with_label_values(&[algorithm.as_str()])
            .set(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratelimit_advisor_core::types::{Outcome, Recommendation};

    #[test]
    fn record_publishes_nan_for_unknown_observed_rps() {
        let metrics = Metrics::new().unwrap();
        let outcome = DecisionOutcome {
            outcome: Outcome::ValidationError,
            recommendation: Recommendation {
                algorithm: Algorithm::Fixed,
                limit: Some(60),
                window: Some(60),
                capacity: None,
                fill_rate: None,
                predicted_rps: None,
                valid_for: Some(60),
            },
            observed_rps: None,
            predicted_rps: None,
            history_points: 3,
            forecast_duration_seconds: None,
        };
        metrics.record(&outcome);
        assert!(metrics.last_observed_rps.get().is_nan());
        assert!(metrics.last_predicted_rps.get().is_nan());
        assert_eq!(metrics.history_points.get(), 3.0);
    }

    #[test]
    fn record_sets_exactly_one_algorithm_label_to_one() {
        let metrics = Metrics::new().unwrap();
        let outcome = DecisionOutcome {
            outcome: Outcome::Ok,
            recommendation: Recommendation {
                algorithm: Algorithm::Token,
                limit: None,
                window: None,
                capacity: Some(20),
                fill_rate: Some(10.0),
                predicted_rps: Some(10.0),
                valid_for: Some(60),
            },
            observed_rps: Some(10.0),
            predicted_rps: Some(10.0),
            history_points: 5,
            forecast_duration_seconds: Some(0.001),
        };
        metrics.record(&outcome);
        assert_eq!(metrics.last_algorithm.with_label_values(&["token"]).get(), 1.0);
        assert_eq!(metrics.last_algorithm.with_label_values(&["fixed"]).get(), 0.0);
        assert_eq!(metrics.last_algorithm.with_label_values(&["sliding"]).get(), 0.0);
        assert_eq!(metrics.last_recommended_limit.get(), 0.0);
        assert_eq!(metrics.last_recommended_window_seconds.get(), 0.0);
    }

    #[test]
    fn record_publishes_zero_not_nan_for_fields_not_applicable_to_algorithm() {
        let metrics = Metrics::new().unwrap();
        let fixed_outcome = DecisionOutcome {
            outcome: Outcome::Ok,
            recommendation: Recommendation {
                algorithm: Algorithm::Fixed,
                limit: Some(120),
                window: Some(1),
                capacity: None,
                fill_rate: None,
                predicted_rps: Some(100.0),
                valid_for: Some(60),
            },
            observed_rps: Some(100.0),
            predicted_rps: Some(100.0),
            history_points: 1,
            forecast_duration_seconds: Some(0.001),
        };
        metrics.record(&fixed_outcome);
        assert_eq!(metrics.last_recommended_capacity.get(), 0.0);
        assert_eq!(metrics.last_recommended_fill_rate.get(), 0.0);

        // Same check holds on the validation-error path, matching
        // `update_metrics_from_response` in `original_source`.
        let validation_error_outcome = DecisionOutcome {
            outcome: Outcome::ValidationError,
            recommendation: Recommendation {
                algorithm: Algorithm::Token,
                limit: None,
                window: None,
                capacity: Some(20),
                fill_rate: Some(10.0),
                predicted_rps: None,
                valid_for: Some(60),
            },
            observed_rps: None,
            predicted_rps: None,
            history_points: 0,
            forecast_duration_seconds: None,
        };
        metrics.record(&validation_error_outcome);
        assert_eq!(metrics.last_recommended_limit.get(), 0.0);
        assert_eq!(metrics.last_recommended_window_seconds.get(), 0.0);
    }
}
