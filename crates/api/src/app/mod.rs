//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/dispatcher wiring and the orchestrator handle
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, extract::DefaultBodyLimit, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services};

/// Room left around the payload for the request envelope and JSON framing.
const BODY_ENVELOPE_SLACK: usize = 64 * 1024;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: &AppConfig, services: Arc<AppServices>) -> Router {
    let jwt = Arc::new(jobrelay_auth::Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let internal =
        routes::internal_router().layer(axum::middleware::from_fn(middleware::require_dispatcher));

    // Transport cap sits above the domain payload limit.
    let body_limit = config
        .orchestrator
        .max_payload_bytes
        .saturating_add(BODY_ENVELOPE_SLACK);

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .merge(internal)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            ),
        )
}
