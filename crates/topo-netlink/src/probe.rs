use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::sleep;
use topo_graph::Graph;
use topo_probe::{Probe, ProbeLifecycle, ProbeState, run_guarded_loop};
use topo_types::{Identifier, MetadataFilter, attr, node_type};
use tracing::{debug, info, info_span, warn};
use tracing::Instrument;

use crate::link_source::{LinkEvent, LinkSource};
use crate::queue::DeferredQueue;
use crate::reconcile::{self, veth_layer2_metadata};

const READINESS_TIMEOUT: Duration = Duration::from_secs(1);
const VETH_RETRY_ATTEMPTS: u32 = 10;
const VETH_RETRY_DELAY: Duration = Duration::from_millis(200);

/// The netlink probe (§4.C): one instance per network namespace, rooted
/// either at the host root node or (spawned by the namespace probe, §4.D)
/// at a `netns` node.
pub struct NetlinkProbe {
    name: &'static str,
    graph: Arc<Graph>,
    root: Identifier,
    source: Arc<dyn LinkSource>,
    queue: Mutex<DeferredQueue>,
    lifecycle: Arc<ProbeLifecycle>,
}

impl NetlinkProbe {
    pub fn new(graph: Arc<Graph>, root: Identifier, source: Arc<dyn LinkSource>) -> Arc<Self> {
        Arc::new(Self {
            name: "netlink",
            graph,
            root,
            source,
            queue: Mutex::new(DeferredQueue::new()),
            lifecycle: Arc::new(ProbeLifecycle::new()),
        })
    }

    async fn on_link_added(&self, index: u32) {
        let Some(link) = self.source.get_link(index).await else {
            debug!(ifindex = index, "link vanished before it could be resolved");
            return;
        };

        let outcome = {
            let mut writer = self.graph.write();
            let mut queue = self.queue.lock();
            reconcile::on_link_added(&mut writer, &self.root, &mut queue, &link)
        };

        let Some(node_id) = outcome.node_id else {
            return;
        };
        if !outcome.is_veth {
            return;
        }

        let Some(peer_index) = self.source.peer_ifindex(index).await else {
            return;
        };
        if index <= peer_index {
            // The other side of the pair is responsible for linking (tie-break).
            return;
        }

        self.resolve_veth_peer(node_id, index, peer_index).await;
    }

    async fn resolve_veth_peer(&self, local_id: Identifier, local_index: u32, peer_index: u32) {
        let filter = MetadataFilter::new()
            .with(attr::IF_INDEX, peer_index as i64)
            .with(attr::TYPE, node_type::VETH);

        for attempt in 0..VETH_RETRY_ATTEMPTS {
            {
                let mut writer = self.graph.write();
                if writer.get_node(&local_id).is_none() {
                    return;
                }
                if let Some(peer) = writer.lookup_first_node(&filter) {
                    writer.link(&local_id, &peer.id, veth_layer2_metadata());
                    return;
                }
            }
            debug!(
                local_index,
                peer_index,
                attempt,
                "veth peer not yet present, retrying"
            );
            sleep(VETH_RETRY_DELAY).await;
        }
        debug!(local_index, peer_index, "veth peer never appeared, abandoning");
    }

    async fn on_link_deleted(&self, index: u32) {
        let still_present = self.source.get_link(index).await.is_some();
        let mut writer = self.graph.write();
        let mut queue = self.queue.lock();
        reconcile::on_link_deleted(&mut writer, &self.root, &mut queue, index, still_present);
    }

    async fn enumerate_initial_links(&self) {
        for link in self.source.list_links().await {
            let index = link.index;
            let outcome = {
                let mut writer = self.graph.write();
                let mut queue = self.queue.lock();
                reconcile::on_link_added(&mut writer, &self.root, &mut queue, &link)
            };
            if let Some(node_id) = outcome.node_id
                && outcome.is_veth
                && let Some(peer_index) = self.source.peer_ifindex(index).await
                && index > peer_index
            {
                self.resolve_veth_peer(node_id, index, peer_index).await;
            }
        }
    }

    async fn run(self: Arc<Self>) {
        self.enumerate_initial_links().await;

        let lifecycle = self.lifecycle.clone();
        run_guarded_loop(lifecycle, self.name, || {
            let this = self.clone();
            async move {
                match this.source.next_event(READINESS_TIMEOUT).await {
                    Some(LinkEvent::New(index)) => this.on_link_added(index).await,
                    Some(LinkEvent::Del(index)) => this.on_link_deleted(index).await,
                    None => {}
                }
            }
        })
        .await;
    }
}

impl Probe for NetlinkProbe {
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
                info!("netlink probe starting");
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
    use crate::link_source::KernelLink;
    use std::collections::VecDeque;
    use tokio::sync::Mutex as AsyncMutex;
    use topo_graph::InMemoryBackend;

    struct FakeSource {
        links: AsyncMutex<Vec<KernelLink>>,
        events: AsyncMutex<VecDeque<LinkEvent>>,
    }

    impl LinkSource for FakeSource {
        fn list_links(&self) -> Pin<Box<dyn Future<Output = Vec<KernelLink>> + Send + '_>> {
            Box::pin(async move { self.links.lock().await.clone() })
        }

        fn get_link(&self, index: u32) -> Pin<Box<dyn Future<Output = Option<KernelLink>> + Send + '_>> {
            Box::pin(async move {
                self.links.lock().await.iter().find(|l| l.index == index).cloned()
            })
        }

        fn peer_ifindex(&self, _index: u32) -> Pin<Box<dyn Future<Output = Option<u32>> + Send + '_>> {
            Box::pin(async move { None })
        }

        fn next_event(
            &self,
            _timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = Option<LinkEvent>> + Send + '_>> {
            Box::pin(async move { self.events.lock().await.pop_front() })
        }
    }

    fn new_link(index: u32, name: &str) -> KernelLink {
        KernelLink {
            index,
            name: name.into(),
            kind: String::new(),
            mac: None,
            mtu: None,
            ipv4: String::new(),
            up: true,
            master_index: None,
            vlan_id: None,
            bond_mode: None,
            driver: String::new(),
        }
    }

    #[tokio::test]
    async fn enumerates_initial_links_as_if_new() {
        let graph = Arc::new(Graph::new(Box::new(InMemoryBackend::new()), "test-host"));
        let root = graph.root().clone();
        let source: Arc<dyn LinkSource> = Arc::new(FakeSource {
            links: AsyncMutex::new(vec![new_link(1, "eth0")]),
            events: AsyncMutex::new(VecDeque::new()),
        });

        let probe = NetlinkProbe::new(graph.clone(), root.clone(), source);
        probe.enumerate_initial_links().await;

        let nodes = graph.read().lookup_nodes(&MetadataFilter::new().with(attr::NAME, "eth0"));
        assert_eq!(nodes.len(), 1);
    }

    #[tokio::test]
    async fn start_stop_round_trips_through_lifecycle() {
        let graph = Arc::new(Graph::new(Box::new(InMemoryBackend::new()), "test-host"));
        let root = graph.root().clone();
        let source: Arc<dyn LinkSource> = Arc::new(FakeSource {
            links: AsyncMutex::new(vec![]),
            events: AsyncMutex::new(VecDeque::new()),
        });

        let probe = NetlinkProbe::new(graph, root, source);
        probe.clone().start();
        assert_eq!(probe.state(), ProbeState::Running);
        probe.stop().await;
        assert_eq!(probe.state(), ProbeState::Stopped);
    }
}
