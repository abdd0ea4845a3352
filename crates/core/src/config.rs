//! Engine configuration record.
//!
//! Every field mirrors one of the environment variables in the spec's external
//! interfaces table. `from_env` never panics or fails: an unset or unparsable variable
//! falls back to its documented default, same posture as the Python reference's
//! `os.getenv(name, default)` plus `int()`/`float()` coercion.

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub history_window_seconds: i64,
    pub max_history_points: usize,
    pub min_history_points: usize,
    pub forecast_seconds: i64,
    pub fallback_window_points: usize,

    pub min_change_interval_seconds: i64,
    pub min_relative_change: f64,
    pub increase_threshold: f64,
    pub decrease_threshold: f64,
    pub increase_headroom: f64,
    pub decrease_factor: f64,

    pub min_rps: f64,
    pub max_rps: f64,

    pub rejected_rate_threshold: f64,
    pub latency_p95_threshold: f64,
    pub errors_5xx_threshold: i64,
    pub ddos_multiplier: f64,

    pub default_window_seconds: i64,
    pub token_capacity_seconds: f64,
    pub max_capacity: i64,

    pub allow_algo_switch: bool,
    pub min_algo_switch_interval_seconds: i64,
    pub burstiness_threshold: f64,
    pub burstiness_points: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_window_seconds: 3600,
            max_history_points: 5000,
            min_history_points: 10,
            forecast_seconds: 60,
            fallback_window_points: 5,

            min_change_interval_seconds: 30,
            min_relative_change: 0.1,
            increase_threshold: 0.1,
            decrease_threshold: 0.2,
            increase_headroom: 0.05,
            decrease_factor: 0.7,

            min_rps: 1.0,
            max_rps: 10_000.0,

            rejected_rate_threshold: 0.1,
            latency_p95_threshold: 1.0,
            errors_5xx_threshold: 1,
            ddos_multiplier: 2.0,

            default_window_seconds: 60,
            token_capacity_seconds: 2.0,
            max_capacity: 0,

            allow_algo_switch: false,
            min_algo_switch_interval_seconds: 300,
            burstiness_threshold: 1.5,
            burstiness_points: 10,
        }
    }
}

impl EngineConfig {
    /// `MAX_RPS <= 0` disables the upper clamp.
    pub fn max_rps(&self) -> Option<f64> {
        (self.max_rps > 0.0).then_some(self.max_rps)
    }

    /// `MAX_CAPACITY <= 0` disables the capacity cap.
    pub fn max_capacity(&self) -> Option<i64> {
        (self.max_capacity > 0).then_some(self.max_capacity)
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            history_window_seconds: env_i64(
                "HISTORY_WINDOW_SECONDS",
                defaults.history_window_seconds,
            ),
            max_history_points: env_usize("MAX_HISTORY_POINTS", defaults.max_history_points),
            min_history_points: env_usize("MIN_HISTORY_POINTS", defaults.min_history_points),
            forecast_seconds: env_i64("FORECAST_SECONDS", defaults.forecast_seconds),
            fallback_window_points: env_usize(
                "FALLBACK_WINDOW_POINTS",
                defaults.fallback_window_points,
            ),

            min_change_interval_seconds: env_i64(
                "MIN_CHANGE_INTERVAL_SECONDS",
                defaults.min_change_interval_seconds,
            ),
            min_relative_change: env_f64("MIN_RELATIVE_CHANGE", defaults.min_relative_change),
            increase_threshold: env_f64("INCREASE_THRESHOLD", defaults.increase_threshold),
            decrease_threshold: env_f64("DECREASE_THRESHOLD", defaults.decrease_threshold),
            increase_headroom: env_f64("INCREASE_HEADROOM", defaults.increase_headroom),
            decrease_factor: env_f64("DECREASE_FACTOR", defaults.decrease_factor),

            min_rps: env_f64("MIN_RPS", defaults.min_rps),
            max_rps: env_f64("MAX_RPS", defaults.max_rps),

            rejected_rate_threshold: env_f64(
                "REJECTED_RATE_THRESHOLD",
                defaults.rejected_rate_threshold,
            ),
            latency_p95_threshold: env_f64(
                "LATENCY_P95_THRESHOLD",
                defaults.latency_p95_threshold,
            ),
            errors_5xx_threshold: env_i64(
                "ERRORS_5XX_THRESHOLD",
                defaults.errors_5xx_threshold,
            ),
            ddos_multiplier: env_f64("DDOS_MULTIPLIER", defaults.ddos_multiplier),

            default_window_seconds: env_i64(
                "DEFAULT_WINDOW_SECONDS",
                defaults.default_window_seconds,
            ),
            token_capacity_seconds: env_f64(
                "TOKEN_CAPACITY_SECONDS",
                defaults.token_capacity_seconds,
            ),
            max_capacity: env_i64("MAX_CAPACITY", defaults.max_capacity),

            allow_algo_switch: env_bool("ALLOW_ALGO_SWITCH", defaults.allow_algo_switch),
            min_algo_switch_interval_seconds: env_i64(
                "MIN_ALGO_SWITCH_INTERVAL_SECONDS",
                defaults.min_algo_switch_interval_seconds,
            ),
            burstiness_threshold: env_f64("BURSTINESS_THRESHOLD", defaults.burstiness_threshold),
            burstiness_points: env_usize("BURSTINESS_POINTS", defaults.burstiness_points),
        }
    }
}

fn env_raw(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_i64(name: &str, default: i64) -> i64 {
    match env_raw(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "invalid integer env var, using default");
            default
        }),
        None => default,
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    match env_raw(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "invalid integer env var, using default");
            default
        }),
        None => default,
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match env_raw(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "invalid float env var, using default");
            default
        }),
        None => default,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_raw(name) {
        Some(raw) => raw.eq_ignore_ascii_case("true"),
        None => default,
    }
}
