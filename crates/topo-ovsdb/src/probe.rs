use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use topo_graph::Graph;
use topo_probe::{Probe, ProbeLifecycle, ProbeState, run_guarded_loop};
use topo_types::Identifier;
use tracing::Instrument;
use tracing::{info, info_span, warn};

use crate::error::OvsdbError;
use crate::json::Json;
use crate::reconcile::{self, TABLE_BRIDGE, TABLE_INTERFACE, TABLE_PORT};
use crate::rows::RowCache;
use crate::rpc::OvsdbTransport;

const RECV_POLL: Duration = Duration::from_secs(1);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MONITORED_TABLES: [&str; 3] = [TABLE_BRIDGE, TABLE_PORT, TABLE_INTERFACE];
const DB_NAME: &str = "Open_vSwitch";

/// The OVSDB probe (§4.E): one persistent JSON-RPC connection to the
/// switch's management socket, reconciling `Bridge`/`Port`/`Interface` rows
/// into the graph rooted at the host.
pub struct OvsdbProbe {
    name: &'static str,
    graph: Arc<Graph>,
    root: Identifier,
    host: String,
    port: u16,
    lifecycle: Arc<ProbeLifecycle>,
}

impl OvsdbProbe {
    pub fn new(graph: Arc<Graph>, host: impl Into<String>, port: u16) -> Arc<Self> {
        let root = graph.root().clone();
        Arc::new(Self {
            name: "ovsdb",
            graph,
            root,
            host: host.into(),
            port,
            lifecycle: Arc::new(ProbeLifecycle::new()),
        })
    }

    fn apply(&self, cache: &mut RowCache, payload: &Json) {
        let changes = cache.apply(payload);
        if changes.is_empty() {
            return;
        }
        let mut writer = self.graph.write();
        reconcile::apply_row_changes(&mut writer, &self.root, cache, &changes);
    }

    /// One connection's worth of work: connect, `monitor` the tracked
    /// tables, fold the initial reply plus any interleaved `update`
    /// notifications into the graph, then keep consuming `update`s until
    /// the connection drops or the probe is asked to stop (§4.E, §7
    /// "Transient I/O").
    async fn run_session(&self) -> Result<(), OvsdbError> {
        let mut transport = OvsdbTransport::connect(&self.host, self.port).await?;
        let mut cache = RowCache::new();

        let mut interleaved = Vec::new();
        let monitor_reply = transport.call("monitor", monitor_request(), |notification| interleaved.push(notification)).await?;

        self.apply(&mut cache, &monitor_reply);
        for notification in interleaved.drain(..) {
            if let Some(update) = update_payload(&notification) {
                self.apply(&mut cache, update);
            }
        }

        info!(host = %self.host, port = self.port, "connected to ovsdb");

        while self.lifecycle.should_continue() {
            match timeout(RECV_POLL, transport.recv()).await {
                Ok(Ok(message)) => {
                    if let Some(update) = update_payload(&message) {
                        self.apply(&mut cache, update);
                    }
                }
                Ok(Err(err)) => return Err(err),
                Err(_elapsed) => {} // poll timeout, just recheck should_continue
            }
        }
        Ok(())
    }

    async fn run(self: Arc<Self>) {
        let lifecycle = self.lifecycle.clone();
        run_guarded_loop(lifecycle, self.name, || {
            let this = self.clone();
            async move {
                if let Err(err) = this.run_session().await {
                    warn!(error = %err, "ovsdb session ended, reconnecting");
                    sleep(RECONNECT_DELAY).await;
                }
            }
        })
        .await;
    }
}

/// `["<db>", "<monitor-id>", {table: {"columns": null}, ...}]` requesting
/// every column of each tracked table (a null `columns` entry means "all").
fn monitor_request() -> Json {
    let tables = MONITORED_TABLES
        .iter()
        .map(|table| (table.to_string(), Json::object([("columns".to_string(), Json::Null)])))
        .collect::<std::collections::BTreeMap<_, _>>();
    Json::Array(vec![Json::string(DB_NAME), Json::string("topo"), Json::Object(tables)])
}

/// An `update` notification's `params` is `["<monitor-id>", {table: {uuid:
/// {old?, new?}}}]`; only the second element is the row payload `RowCache`
/// understands.
fn update_payload(message: &Json) -> Option<&Json> {
    if message.get("method").and_then(Json::as_str) != Some("update") {
        return None;
    }
    message.get("params").and_then(Json::as_array).and_then(|params| params.get(1))
}

impl Probe for OvsdbProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(self: Arc<Self>) {
        if !self.lifecycle.try_start() {
            return;
        }
        let span = info_span!("probe", name = self.name);
        tokio::spawn(
            async move {
                info!("ovsdb probe starting");
                self.run().await;
            }
            .instrument(span),
        );
    }

    fn stop<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.lifecycle.request_stop();
            self.lifecycle.wait_stopped().await;
        })
    }

    fn state(&self) -> ProbeState {
        self.lifecycle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_request_names_every_tracked_table() {
        let request = monitor_request();
        let tables = request.as_array().unwrap()[2].as_object().unwrap();
        assert!(tables.contains_key(TABLE_BRIDGE));
        assert!(tables.contains_key(TABLE_PORT));
        assert!(tables.contains_key(TABLE_INTERFACE));
    }

    #[test]
    fn update_payload_extracts_the_row_map_and_ignores_other_methods() {
        let update = Json::object([
            ("method".to_string(), Json::string("update")),
            ("params".to_string(), Json::Array(vec![Json::string("topo"), Json::object([("Bridge".to_string(), Json::Null)])])),
        ]);
        assert!(update_payload(&update).is_some());

        let echo = Json::object([("method".to_string(), Json::string("echo"))]);
        assert!(update_payload(&echo).is_none());
    }

    // `run_session` needs a live ovsdb-server socket to exercise end-to-end;
    // that's covered by the `#[ignore]`d integration scenarios rather than
    // a unit test here (mirrors `rpc::OvsdbTransport`, which has the same
    // constraint).
}
