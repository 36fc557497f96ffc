use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use common::types::Health;
use service::broker::Broker;

pub mod broker;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    /// Deadline handed to the provisioner with every mutating request.
    pub provisioner_timeout: Option<Duration>,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn metrics() -> (StatusCode, String) {
    match service::metrics::encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Build the full application router: broker API plus health and metrics.
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    // Operational routes (health + metrics)
    let ops = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics));

    // Service broker API v2
    let v2 = Router::new()
        .route("/v2/catalog", get(broker::catalog))
        .route(
            "/v2/service_instances/:instance_id",
            put(broker::provision).delete(broker::deprovision).patch(broker::update),
        )
        .route("/v2/service_instances/:instance_id/last_operation", get(broker::last_operation))
        .route(
            "/v2/service_instances/:instance_id/service_bindings/:binding_id",
            put(broker::bind).delete(broker::unbind),
        );

    ops.merge(v2)
        .with_state(state)
        .layer(cors)
        // Request tracing: one span per request, failures at error level
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
