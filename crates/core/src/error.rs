//! Error taxonomy for the advisor engine.
//!
//! `Schema` and `Config` are always recovered locally by the caller (server::handlers);
//! they exist as distinct variants so logging and metrics can tell the two failure modes
//! apart, not because either one is allowed to reach an HTTP client as a 4xx from
//! `/v1/limit-config`. There is no `Internal` variant: the one condition spec.md §7 names
//! as `InternalError` (an unanticipated failure) has no representable state in this
//! engine to construct it from — the state/buffer locks recover from poisoning rather
//! than fail, per the engine's "a usable recommendation always beats an error" principle,
//! so an uncaught panic falls straight through to the underlying server's default
//! behavior, same as spec.md §7 describes.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("request body does not parse: {0}")]
    Schema(String),

    #[error("current config invalid: {0}")]
    Config(String),

    #[error("forecaster failed: {0}")]
    Forecaster(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
