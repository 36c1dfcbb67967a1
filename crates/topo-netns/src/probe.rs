use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use topo_graph::Graph;
use topo_netlink::{LinkSource, NetlinkProbe, RtNetlinkSource};
use topo_probe::{Probe, ProbeLifecycle, ProbeState, run_guarded_loop};
use topo_types::{Identifier, Metadata, MetadataFilter, RelationType, attr, node_type};
use tracing::{debug, info, info_span, warn};
use tracing::Instrument;

use crate::enter::enter_netns;
use crate::watch::list_namespaces;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

struct SubProbe {
    node_id: Identifier,
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// The namespace probe (§4.D): one per process, watching the netns mount
/// directory and owning a [`NetlinkProbe`] re-rooted under each namespace
/// it discovers.
pub struct NetnsProbe {
    name: &'static str,
    graph: Arc<Graph>,
    dir: PathBuf,
    lifecycle: Arc<ProbeLifecycle>,
    active: Mutex<HashMap<String, SubProbe>>,
}

impl NetnsProbe {
    pub fn new(graph: Arc<Graph>, dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            name: "netns",
            graph,
            dir: dir.into(),
            lifecycle: Arc::new(ProbeLifecycle::new()),
            active: Mutex::new(HashMap::new()),
        })
    }

    async fn scan_once(&self) {
        let seen = list_namespaces(&self.dir).await;
        let mut active = self.active.lock().await;

        let removed: Vec<String> = active.keys().filter(|n| !seen.contains(n.as_str())).cloned().collect();
        for name in removed {
            if let Some(sub) = active.remove(&name) {
                self.stop_sub_probe(sub, &name).await;
            }
        }

        let added: Vec<String> = seen.into_iter().filter(|n| !active.contains_key(n)).collect();
        for name in added {
            let sub = self.spawn_sub_probe(&name).await;
            active.insert(name, sub);
        }
    }

    async fn spawn_sub_probe(&self, name: &str) -> SubProbe {
        let filter = MetadataFilter::new().with(attr::TYPE, node_type::NETNS).with(attr::NAME, name);
        let node = {
            let mut writer = self.graph.write();
            if let Some(existing) = writer.lookup_first_node(&filter) {
                existing
            } else {
                let metadata = Metadata::new().with(attr::TYPE, node_type::NETNS).with(attr::NAME, name);
                let node = writer.new_node(metadata);
                let node = writer.add_node(node);
                writer.link(
                    self.graph.root(),
                    &node.id,
                    Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership),
                );
                node
            }
        };

        let ns_path = self.dir.join(name);
        let graph = self.graph.clone();
        let node_id = node.id.clone();
        let (stop_tx, stop_rx) = oneshot::channel();
        let ns_name = name.to_string();

        let thread = std::thread::Builder::new()
            .name(format!("topo-netns-{name}"))
            .spawn(move || run_netlink_subprobe(ns_path, ns_name, graph, node_id, stop_rx))
            .expect("failed to spawn netns subprobe thread");

        info!(ns = name, "namespace discovered, netlink subprobe spawned");

        SubProbe {
            node_id: node.id,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }

    async fn stop_sub_probe(&self, mut sub: SubProbe, name: &str) {
        if let Some(tx) = sub.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = sub.thread.take() {
            let name = name.to_string();
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!(ns = %name, "netns subprobe thread panicked"),
                Err(e) => warn!(ns = %name, %e, "failed to join netns subprobe thread"),
            }
        }

        let mut writer = self.graph.write();
        writer.del_node_cascade(&sub.node_id);
        info!(ns = name, "namespace gone, netlink subprobe stopped and node removed");
    }

    async fn run(self: Arc<Self>) {
        let lifecycle = self.lifecycle.clone();
        run_guarded_loop(lifecycle, self.name, || {
            let this = self.clone();
            async move {
                this.scan_once().await;
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;
    }
}

fn run_netlink_subprobe(
    ns_path: PathBuf,
    ns_name: String,
    graph: Arc<Graph>,
    node_id: Identifier,
    stop_rx: oneshot::Receiver<()>,
) {
    if let Err(e) = enter_netns(&ns_path) {
        warn!(ns = %ns_name, %e, "failed to enter network namespace");
        return;
    }

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            warn!(ns = %ns_name, %e, "failed to build per-namespace tokio runtime");
            return;
        }
    };

    rt.block_on(async move {
        let source: Arc<dyn LinkSource> = match RtNetlinkSource::open_current_namespace() {
            Ok(source) => Arc::new(source),
            Err(e) => {
                warn!(ns = %ns_name, %e, "failed to open rtnetlink source inside namespace");
                return;
            }
        };
        let probe = NetlinkProbe::new(graph, node_id, source);
        probe.clone().start();
        let _ = stop_rx.await;
        probe.stop().await;
        debug!(ns = %ns_name, "netlink subprobe quiesced");
    });
}

impl Probe for NetnsProbe {
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
                info!("namespace probe starting");
                self.run().await;
            }
            .instrument(span),
        );
    }

    fn stop<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.lifecycle.request_stop();
            self.lifecycle.wait_stopped().await;

            let mut active = self.active.lock().await;
            for (name, sub) in active.drain() {
                self.stop_sub_probe(sub, &name).await;
            }
        })
    }

    fn state(&self) -> ProbeState {
        self.lifecycle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_graph::InMemoryBackend;

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("topo-netns-probe-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn start_stop_round_trips_through_lifecycle_with_no_namespaces() {
        let dir = tempdir();
        let graph = Arc::new(Graph::new(Box::new(InMemoryBackend::new()), "test-host"));

        let probe = NetnsProbe::new(graph, &dir);
        probe.clone().start();
        assert_eq!(probe.state(), ProbeState::Running);

        tokio::time::sleep(Duration::from_millis(20)).await;
        probe.stop().await;
        assert_eq!(probe.state(), ProbeState::Stopped);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn scan_creates_a_netns_node_for_a_discovered_namespace() {
        let dir = tempdir();
        tokio::fs::write(dir.join("ns1"), b"").await.unwrap();
        let graph = Arc::new(Graph::new(Box::new(InMemoryBackend::new()), "test-host"));

        let probe = NetnsProbe::new(graph.clone(), &dir);
        probe.scan_once().await;

        let nodes = graph
            .read()
            .lookup_nodes(&MetadataFilter::new().with(attr::TYPE, node_type::NETNS).with(attr::NAME, "ns1"));
        assert_eq!(nodes.len(), 1);

        probe.stop().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
