//! HTTP API application wiring (Axum router + shared state).
//!
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs, display shapes and extractors
//! - `errors.rs`: consistent error responses
//! - `sessions.rs`: sign-in / session issuing

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use chrono::Duration;
use tower::ServiceBuilder;

use coursedesk_infra::Store;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod sessions;

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub session_ttl: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    // Public routes: `/getsession` answers `{"login": false}` instead of 401.
    let public = Router::new()
        .route("/health", get(routes::system::health))
        .route("/getsession", get(routes::system::get_session))
        .layer(Extension(state.clone()));

    // Protected routes: require a valid session.
    let protected = routes::router()
        .layer(Extension(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::identity_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::request_log)))
}
