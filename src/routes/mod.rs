//! HTTP routes.
//!
//! The health endpoint is mounted on every path listed in `[health].routes`.
//! Responses are never cacheable, and each request runs inside a span that
//! carries a unique request id.

pub mod health;

use std::collections::BTreeSet;

use axum::{middleware, routing::get, Router};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CACHE_CONTROL_NO_CACHE;
use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Creates the Axum router with the health routes and no-cache headers.
pub fn create_router(state: AppState) -> Router {
    // Duplicate paths would make axum panic on registration
    let paths: BTreeSet<&str> = state
        .config
        .health
        .routes
        .iter()
        .map(String::as_str)
        .collect();

    let health_routes = paths
        .into_iter()
        .fold(Router::new(), |router, path| {
            router.route(path, get(health::check))
        })
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_CACHE),
        ));

    Router::new()
        .merge(health_routes)
        .with_state(state)
        // Request context middleware - creates root span and records arrival time
        .layer(middleware::from_fn(request_id_layer))
}
