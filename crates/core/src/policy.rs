//! The recommendation policy: target RPS, algorithm selection, hysteresis, and response
//! construction (spec.md §4.4–§4.5).

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::state::EngineState;
use crate::types::{Algorithm, DecisionRequest, IncomingConfig, Recommendation, TimePoint};

pub(crate) fn clamp(value: f64, min: f64, max: Option<f64>) -> f64 {
    match max {
        Some(max) => value.max(min).min(max),
        None => value.max(min),
    }
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Step 1: the RPS rate implied by a validated current config.
pub fn current_rps_limit(cfg: &IncomingConfig) -> f64 {
    match cfg.algorithm {
        Algorithm::Fixed | Algorithm::Sliding => {
            let limit = cfg.limit.unwrap_or(0.0);
            let window = cfg.window.unwrap_or(1).max(1) as f64;
            limit / window
        }
        Algorithm::Token => cfg.fill_rate.unwrap_or(0.0),
        Algorithm::Unknown(_) => 0.0,
    }
}

/// Step 2: overload signals.
fn is_overloaded(request: &DecisionRequest, config: &EngineConfig) -> bool {
    request
        .rejected_rate
        .is_some_and(|r| r >= config.rejected_rate_threshold)
        || request
            .latency_p95
            .is_some_and(|l| l >= config.latency_p95_threshold)
        || request
            .errors_5xx
            .is_some_and(|e| e >= config.errors_5xx_threshold)
}

/// Burstiness over the trailing `BurstinessPoints` samples, used to gate a switch to
/// the `token` algorithm.
fn is_bursty(points: &[TimePoint], config: &EngineConfig) -> bool {
    let min_required = config.burstiness_points.max(2);
    if points.len() < min_required {
        return false;
    }
    let window = config.burstiness_points.min(points.len());
    let tail = &points[points.len() - window..];
    let mean = tail.iter().map(|p| p.rps).sum::<f64>() / tail.len() as f64;
    if mean <= 0.0 {
        return false;
    }
    let peak = tail.iter().map(|p| p.rps).fold(f64::MIN, f64::max);
    peak / mean >= config.burstiness_threshold
}

/// Step 6: builds a response for `(algorithm, target_rps, current_config)`. Used both
/// for the proposed recommendation and for the "keep current" rebuild used by the
/// hysteresis branches.
pub fn build_response(
    algorithm: &Algorithm,
    target_rps: f64,
    current_config: &IncomingConfig,
    predicted_rps: Option<f64>,
    config: &EngineConfig,
) -> Recommendation {
    match algorithm {
        Algorithm::Fixed | Algorithm::Sliding => {
            let window = current_config
                .window
                .filter(|w| *w > 0)
                .unwrap_or(config.default_window_seconds);
            let mut limit = (target_rps * window as f64).ceil() as i64;
            let min_limit = (config.min_rps * window as f64).ceil() as i64;
            limit = limit.max(min_limit);
            if let Some(max_rps) = config.max_rps() {
                let max_limit = (max_rps * window as f64).floor() as i64;
                limit = limit.min(max_limit);
            }
            Recommendation {
                algorithm: algorithm.clone(),
                limit: Some(limit),
                window: Some(window),
                capacity: None,
                fill_rate: None,
                predicted_rps,
                valid_for: Some(config.forecast_seconds),
            }
        }
        Algorithm::Token => {
            let fill_rate = round3(clamp(target_rps, config.min_rps, config.max_rps()));
            let a = (fill_rate * config.token_capacity_seconds).ceil() as i64;
            let b = (config.min_rps * config.token_capacity_seconds).ceil() as i64;
            let c = fill_rate.ceil() as i64;
            let mut capacity = a.max(b).max(c);
            if let Some(max_capacity) = config.max_capacity() {
                capacity = capacity.min(max_capacity);
            }
            Recommendation {
                algorithm: algorithm.clone(),
                limit: None,
                window: None,
                capacity: Some(capacity),
                fill_rate: Some(fill_rate),
                predicted_rps,
                valid_for: Some(config.forecast_seconds),
            }
        }
        Algorithm::Unknown(_) => Recommendation {
            algorithm: algorithm.clone(),
            limit: current_config.limit.map(|l| l as i64),
            window: current_config.window,
            capacity: current_config.capacity,
            fill_rate: current_config.fill_rate,
            predicted_rps,
            valid_for: Some(config.forecast_seconds),
        },
    }
}

/// Config equality per spec.md §4.5.
pub fn configs_equal(current: &IncomingConfig, recommended: &Recommendation) -> bool {
    if current.algorithm != recommended.algorithm {
        return false;
    }
    match current.algorithm {
        Algorithm::Fixed | Algorithm::Sliding => {
            match (current.limit, current.window, recommended.limit, recommended.window) {
                (Some(limit), Some(window), Some(rec_limit), Some(rec_window)) => {
                    limit as i64 == rec_limit && window == rec_window
                }
                _ => false,
            }
        }
        Algorithm::Token => match (
            current.capacity,
            current.fill_rate,
            recommended.capacity,
            recommended.fill_rate,
        ) {
            (Some(capacity), Some(fill_rate), Some(rec_capacity), Some(rec_fill_rate)) => {
                capacity == rec_capacity && (fill_rate - rec_fill_rate).abs() < 1e-6
            }
            _ => false,
        },
        Algorithm::Unknown(_) => false,
    }
}

/// The full decision: target RPS, optional algorithm switch, and anti-flap hysteresis.
/// `predicted_rps` should be the clamped forecast, not yet rounded for publication — the
/// overload/spike/growth comparisons run on that full-precision value, and only the copy
/// attached to the returned `Recommendation` is rounded, matching the reference's
/// `recommend_config`. Mutates `state.last_change_at` / `state.last_algo_switch_at` in
/// place exactly as that function does.
pub fn decide(
    request: &DecisionRequest,
    predicted_rps: f64,
    history: &[TimePoint],
    state: &mut EngineState,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Recommendation {
    let current_config = &request.current_config;
    let current_limit = current_rps_limit(current_config);
    let predicted_rps = clamp(predicted_rps, 0.0, config.max_rps());

    let overload = is_overloaded(request, config);
    let spike = predicted_rps >= current_limit * config.ddos_multiplier;

    let mut target = current_limit;
    if overload || spike {
        target = current_limit * config.decrease_factor;
    } else if predicted_rps > current_limit * (1.0 + config.increase_threshold) {
        target = predicted_rps * (1.0 + config.increase_headroom);
    } else if predicted_rps < current_limit * (1.0 - config.decrease_threshold) {
        target = predicted_rps;
    }

    target = clamp(target, config.min_rps, config.max_rps());
    if !target.is_finite() {
        target = current_limit;
    }

    let algo_switch_allowed = config.allow_algo_switch
        && state.last_algo_switch_at.is_none_or(|t| {
            (now - t).num_seconds() >= config.min_algo_switch_interval_seconds
        });

    let mut desired_algorithm = current_config.algorithm.clone();
    if algo_switch_allowed {
        if is_bursty(history, config) {
            desired_algorithm = Algorithm::Token;
        } else if desired_algorithm == Algorithm::Token {
            desired_algorithm = Algorithm::Sliding;
        }
    }

    let rounded_predicted = Some(round3(predicted_rps));
    let recommendation = build_response(
        &desired_algorithm,
        target,
        current_config,
        rounded_predicted,
        config,
    );

    let change_ratio = if current_limit > 0.0 {
        (target - current_limit).abs() / current_limit
    } else {
        0.0
    };
    let recent_change_block = state
        .last_change_at
        .is_some_and(|t| (now - t).num_seconds() < config.min_change_interval_seconds);

    if configs_equal(current_config, &recommendation) {
        return recommendation;
    }
    if desired_algorithm == current_config.algorithm && change_ratio < config.min_relative_change {
        return build_response(
            &current_config.algorithm,
            current_limit,
            current_config,
            rounded_predicted,
            config,
        );
    }
    if recent_change_block {
        return build_response(
            &current_config.algorithm,
            current_limit,
            current_config,
            rounded_predicted,
            config,
        );
    }

    state.last_change_at = Some(now);
    if desired_algorithm != current_config.algorithm {
        state.last_algo_switch_at = Some(now);
    }
    recommendation
}
