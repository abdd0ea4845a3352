//! Process-global engine state (spec.md §3's `EngineState`).

use chrono::{DateTime, Utc};

use crate::types::{IncomingConfig, Recommendation};

/// All state that carries across decisions. Guarded by a single lock in `Engine` — see
/// spec.md §5 on why this lock must never be merged with the buffer's.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub last_change_at: Option<DateTime<Utc>>,
    pub last_algo_switch_at: Option<DateTime<Utc>>,
    pub last_good_recommendation: Option<Recommendation>,
    pub last_good_config: Option<IncomingConfig>,
    pub last_predicted_rps: Option<f64>,
}
