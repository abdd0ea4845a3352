//! Pure domain logic for the rate-limit advisor: no I/O, no async runtime. The HTTP
//! surface in `ratelimit-advisor-server` is the only caller.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod policy;
pub mod state;
pub mod timestamp;
pub mod types;
pub mod validate;

pub use config::EngineConfig;
pub use engine::{DecisionOutcome, Engine};
pub use error::{EngineError, Result};
pub use types::{Algorithm, DecisionRequest, IncomingConfig, Outcome, Recommendation, TimePoint};
