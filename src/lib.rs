pub mod accounts;
pub mod admission;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod token;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::handlers::{gateway_handler, health_handler, metrics_handler};
use crate::state::AppState;

/// Router with health and metrics served directly; everything else goes
/// through the dispatcher. Serve with `into_make_service_with_connect_info`
/// so public routes can see the peer address.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(gateway_handler)
        .with_state(state)
}
