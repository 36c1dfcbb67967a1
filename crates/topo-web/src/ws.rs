use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tokio::time::Instant;
use topo_graph::Event;
use topo_wire::Envelope;
use tracing::{debug, info, warn};

use crate::AppState;

/// Outbound buffer depth per client (§4.G "Per-client outbound messages are
/// buffered"). A client more than this many events behind gets dropped
/// rather than allowed to back-pressure a mutator's write lock.
const HIGH_WATER_MARK: usize = 1024;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    state.connected_clients.fetch_add(1, Ordering::Relaxed);

    let (tx, mut rx) = mpsc::channel::<Message>(HIGH_WATER_MARK);
    let overflowed = Arc::new(AtomicBool::new(false));
    let listener_overflowed = overflowed.clone();
    let host = state.host.clone();

    // Atomically read the current graph and register a listener for
    // everything after it (§9 Open Questions: this is where the source's
    // "snapshot + subscribe under one lock" ordering guarantee is upheld).
    let (nodes, edges, handle) = state.graph.snapshot_and_subscribe(Arc::new(move |event: &Event| {
        let Some(envelope) = envelope_for_event(event, &host) else {
            return;
        };
        let Ok(text) = envelope.to_json() else {
            return;
        };
        if tx.try_send(Message::Text(text.into())).is_err() {
            listener_overflowed.store(true, Ordering::Relaxed);
        }
    }));

    let sync_reply = Envelope::sync_reply(&nodes, &edges, &state.host);
    let sent_sync = match sync_reply.to_json() {
        Ok(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to encode sync reply");
            false
        }
    };

    if sent_sync {
        run_client_loop(socket, &mut rx, &overflowed, state.pong_timeout).await;
    }

    state.graph.unsubscribe(handle);
    state.connected_clients.fetch_sub(1, Ordering::Relaxed);
    debug!("websocket client disconnected");
}

/// The liveness + fan-out loop for one client (§4.G steps 2-4): forwards
/// buffered events, pings on a schedule, and closes on a missed pong or any
/// send error — never blocking the graph's mutators on a slow reader.
async fn run_client_loop(mut socket: WebSocket, rx: &mut mpsc::Receiver<Message>, overflowed: &AtomicBool, pong_timeout: Duration) {
    let ping_interval = pong_timeout / 2;
    let mut ping_ticker = tokio::time::interval(ping_interval);
    let pong_deadline = tokio::time::sleep(pong_timeout);
    tokio::pin!(pong_deadline);
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_ticker.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                // Keep pinging at the schedule even while a pong is still
                // outstanding; only the first ping of an outstanding round
                // arms the deadline, so a client has the full
                // `ws_pong_timeout` to answer (§4.G), not half of it.
                if !awaiting_pong {
                    awaiting_pong = true;
                    pong_deadline.as_mut().reset(Instant::now() + pong_timeout);
                }
            }
            () = &mut pong_deadline, if awaiting_pong => {
                warn!("pong timeout, closing connection");
                break;
            }
            maybe_message = rx.recv() => {
                match maybe_message {
                    Some(message) => {
                        if socket.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
                if overflowed.load(Ordering::Relaxed) {
                    warn!("client fell behind the outbound high-water mark, closing connection");
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }
    info!("websocket client loop exited");
}

fn envelope_for_event(event: &Event, host: &str) -> Option<Envelope> {
    Some(match event {
        Event::NodeAdded(node) => Envelope::node_added(node, host),
        Event::NodeUpdated(node) => Envelope::node_updated(node, host),
        Event::NodeDeleted(id) => Envelope::node_deleted(id),
        Event::EdgeAdded(edge) => Envelope::edge_added(edge, host),
        Event::EdgeUpdated(edge) => Envelope::edge_updated(edge, host),
        Event::EdgeDeleted(id) => Envelope::edge_deleted(id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_types::{Identifier, Metadata, Node};

    #[test]
    fn node_added_envelope_carries_the_graph_namespace() {
        let node = Node::new(Identifier::new("n1"), Metadata::new().with("Type", "bridge"));
        let envelope = envelope_for_event(&Event::NodeAdded(node), "myhost").unwrap();
        assert_eq!(envelope.namespace, "Graph");
        assert_eq!(envelope.kind, topo_wire::TYPE_NODE_ADDED);
    }

    #[test]
    fn node_deleted_envelope_carries_bare_id_and_no_host() {
        let envelope = envelope_for_event(&Event::NodeDeleted(Identifier::new("n1")), "myhost").unwrap();
        assert_eq!(envelope.kind, topo_wire::TYPE_NODE_DELETED);
    }
}
