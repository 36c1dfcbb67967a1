//! The websocket publisher (§4.G): serves `/ws` (snapshot + live graph
//! events) and `/healthz` (liveness for the hosting process) behind one
//! `axum::Router`.
//!
//! Built on the same "state struct + `Router::with_state`" shape the
//! ambient stack uses for its own HTTP servers; the graph crate's
//! snapshot-then-subscribe atomicity (§9 Open Questions) is what makes the
//! per-client handler in [`ws`] race-free against concurrent mutators.

mod health;
mod ws;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use topo_graph::Graph;

/// Shared state handed to every route; cheaply `Clone`, like the rest of
/// the ambient stack's `AppState` structs.
#[derive(Clone)]
pub struct AppState {
    graph: Arc<Graph>,
    host: Arc<str>,
    pong_timeout: Duration,
    connected_clients: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(graph: Arc<Graph>, host: impl Into<Arc<str>>, pong_timeout: Duration) -> Self {
        Self {
            graph,
            host: host.into(),
            pong_timeout,
            connected_clients: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Build the `/ws` + `/healthz` router (§4.G "HTTP surface").
pub fn router(state: AppState) -> Router {
    Router::new().route("/ws", get(ws::ws_handler)).route("/healthz", get(health::healthz)).with_state(state)
}
