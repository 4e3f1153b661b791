//! ringline worker: session pool, routing registration and HTTP call intake.
//!
//! The binary in `main.rs` wires these pieces together; the library exposes
//! them so integration tests can drive the router and worker directly.

pub mod api;
pub mod config;
pub mod registration;
pub mod worker;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use worker::Worker;

/// Application state shared across request handlers.
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<Worker>,
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health_handler))
        .route(
            "/api/calls",
            post(api::assign_call_handler).get(api::list_calls_handler),
        )
        .route("/api/calls/{call_id}", get(api::get_call_handler))
        .route("/api/calls/{call_id}/end", post(api::end_call_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
