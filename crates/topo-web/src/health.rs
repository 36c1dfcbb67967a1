use axum::extract::State;
use axum::response::IntoResponse;
use std::sync::atomic::Ordering;

use crate::AppState;

/// `GET /healthz` (§4.G "HTTP surface", §6 "Health surface"): liveness for
/// the hosting process, not part of the graph protocol.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let connected = state.connected_clients.load(Ordering::Relaxed);
    let body = facet_json::to_string(&HealthBody { connected_clients: connected }).unwrap_or_else(|_| "{}".to_string());
    ([(axum::http::header::CONTENT_TYPE, "application/json; charset=utf-8")], body)
}

#[derive(facet::Facet)]
struct HealthBody {
    connected_clients: usize,
}
