use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::AppState;

// Fallback for every path not served directly by the router
pub async fn gateway_handler(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    state.dispatcher.dispatch(request, peer).await
}
