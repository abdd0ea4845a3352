//! The HTTP surface as a library, so integration tests can bind a real
//! `tiny_http::Server` against it without going through the `ratelimit-advisord` binary.

pub mod handlers;
pub mod metrics;

pub use metrics::Metrics;
