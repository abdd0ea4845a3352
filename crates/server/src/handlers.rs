//! HTTP routing and request/response plumbing (spec.md §4.6). Every route is trivial;
//! the decision route's actual logic lives in `ratelimit_advisor_core::engine::Engine`.

use std::io::Read;

use ratelimit_advisor_core::engine::Engine;
use tiny_http::{Header, Method, Request, Response};

use crate::metrics::Metrics;

const MAX_BODY_BYTES: u64 = 1 << 20;

fn json_header() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("valid header")
}

fn respond_json(request: Request, status: u16, body: &[u8]) {
    let response = Response::from_data(body)
        .with_status_code(status)
        .with_header(json_header());
    let _ = request.respond(response);
}

fn respond_error_list(request: Request, status: u16, errors: Vec<String>) {
    let body = serde_json::json!({ "errors": errors });
    let bytes = serde_json::to_vec(&body).unwrap_or_else(|_| b"{\"errors\":[]}".to_vec());
    respond_json(request, status, &bytes);
}

/// Serves `GET /health` and `GET /metrics` only, for the optional dedicated metrics
/// listener (`--metrics-addr`), which has no business routing decision requests.
pub fn handle_metrics_request(request: Request, metrics: &Metrics) {
    match (request.method().clone(), request.url()) {
        (Method::Get, "/health") => respond_json(request, 200, br#"{"status":"UP"}"#),
        (Method::Get, "/metrics") => respond_json(request, 200, &metrics.render()),
        _ => respond_error_list(request, 422, vec!["no such route on metrics listener".to_string()]),
    }
}

/// Dispatches one accepted connection to the matching route. Runs on a worker thread;
/// `engine` and `metrics` are shared, `Send + Sync` state.
pub fn handle_request(mut request: Request, engine: &Engine, metrics: &Metrics) {
    let method = request.method().clone();
    let url = request.url().to_string();

    match (method, url.as_str()) {
        (Method::Get, "/health") => {
            respond_json(request, 200, br#"{"status":"UP"}"#);
        }
        (Method::Get, "/metrics") => {
            respond_json(request, 200, &metrics.render());
        }
        (Method::Post, "/v1/limit-config") => {
            let mut body = Vec::new();
            let read_result = request
                .as_reader()
                .take(MAX_BODY_BYTES)
                .read_to_end(&mut body);
            if let Err(err) = read_result {
                tracing::warn!(error = %err, "failed to read request body");
            }

            let outcome = engine.decide(&body);
            tracing::info!(
                result = outcome.outcome.as_str(),
                observed_rps = outcome.observed_rps,
                predicted_rps = outcome.predicted_rps,
                algorithm = outcome.recommendation.algorithm.as_str(),
                "decision served"
            );
            metrics.record(&outcome);

            let body = serde_json::to_vec(&outcome.recommendation).unwrap_or_default();
            respond_json(request, 200, &body);
        }
        (method, url) => {
            respond_error_list(request, 422, vec![format!("no such route: {method:?} {url}")]);
        }
    }
}
