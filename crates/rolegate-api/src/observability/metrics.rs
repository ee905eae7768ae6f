//! Prometheus metrics.
//!
//! # Metrics Exposed
//!
//! - `rolegate_cache_hits_total` / `rolegate_cache_misses_total` - store and model id cache
//! - `rolegate_gate_decisions_total{outcome}` - permission gate results
//! - `rolegate_role_writes_total{outcome}` - classified tuple writes
//! - `rolegate_http_requests_total{route, status}` - handled requests

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Handle used to render the Prometheus exposition.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;
    describe_metrics();
    Ok(MetricsState::new(handle))
}

fn describe_metrics() {
    metrics::describe_counter!(
        "rolegate_cache_hits_total",
        "Store and model id lookups served from cache"
    );
    metrics::describe_counter!(
        "rolegate_cache_misses_total",
        "Store and model id lookups that went to the policy engine"
    );
    metrics::describe_counter!(
        "rolegate_gate_decisions_total",
        "Permission gate results by outcome"
    );
    metrics::describe_counter!(
        "rolegate_role_writes_total",
        "Role tuple writes by classified outcome"
    );
    metrics::describe_counter!(
        "rolegate_http_requests_total",
        "HTTP requests by route and status"
    );
}

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the metrics endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}

/// Counts a handled request.
pub(crate) fn record_http_request(route: &'static str, status: u16) {
    metrics::counter!(
        "rolegate_http_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = MetricsState::new(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            record_http_request("authorize", 200);
        });

        let output = state.clone().render();
        assert!(output.contains("rolegate_http_requests_total"));
        assert!(output.contains("route=\"authorize\""));
    }
}
