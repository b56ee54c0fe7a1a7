//! Thin HTTP entry surface over the Process Manager
//!
//! A minimal `axum` router for submission and halt (spec §1 places the
//! entry surface out of the core's scope, "specified only at their
//! interfaces"). Grounded on the teacher's `router::build_router`/`AppState`
//! shape, pared down to the four endpoints this core actually needs.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::mission::ProcessManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ProcessManager>,
}

/// Build the HTTP router (spec-expansion §6 "HTTP adapter").
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/missions", post(handlers::submit_mission))
        .route("/missions", get(handlers::list_processes))
        .route("/missions/queue", get(handlers::list_queue_for))
        .route("/missions/:id/halt", post(handlers::halt_mission))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
