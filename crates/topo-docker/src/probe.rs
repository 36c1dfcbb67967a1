use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use topo_graph::{Graph, GraphWriter};
use topo_ovsdb::Json;
use topo_probe::{Probe, ProbeLifecycle, ProbeState, run_guarded_loop};
use topo_types::{Identifier, Metadata, MetadataFilter, Node, RelationType, attr, node_type};
use tracing::Instrument;
use tracing::{debug, info, info_span, warn};

use crate::error::DockerError;
use crate::model::{ContainerInfo, NetworkMode};
use crate::rpc::DockerTransport;

const RECV_POLL: Duration = Duration::from_secs(1);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Conventional Docker daemon management socket.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// The Docker probe (§4.F): one persistent connection to the daemon's
/// `/events` stream, plus an initial `/containers/json` + per-container
/// `/containers/<id>/json` sweep, reconciling containers into the graph.
pub struct DockerProbe {
    name: &'static str,
    graph: Arc<Graph>,
    root: Identifier,
    socket_path: String,
    lifecycle: Arc<ProbeLifecycle>,
    /// Containers whose namespace correlation (own `netns` node, or the
    /// `netns` of a `--net=container:<other>` sibling) hasn't resolved yet
    /// — the namespace probe or the sibling container may not have shown
    /// up yet (§5 "no happens-before relation… designs must tolerate
    /// either order"). Retried on every poll timeout.
    pending: Mutex<HashMap<String, ContainerInfo>>,
}

impl DockerProbe {
    pub fn new(graph: Arc<Graph>, socket_path: impl Into<String>) -> Arc<Self> {
        let root = graph.root().clone();
        Arc::new(Self {
            name: "docker",
            graph,
            root,
            socket_path: socket_path.into(),
            lifecycle: Arc::new(ProbeLifecycle::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    async fn initial_sync(&self, transport: &DockerTransport) -> Result<(), DockerError> {
        let list = transport.get_json("/containers/json?all=1").await?;
        let Some(items) = list.as_array() else {
            return Ok(());
        };
        let ids: Vec<String> = items.iter().filter_map(|item| item.get("Id").and_then(Json::as_str).map(str::to_string)).collect();
        for id in ids {
            self.inspect_and_reconcile(transport, &id).await;
        }
        Ok(())
    }

    async fn inspect_and_reconcile(&self, transport: &DockerTransport, id: &str) {
        match transport.get_json(&format!("/containers/{id}/json")).await {
            Ok(row) => match ContainerInfo::from_inspect(id, &row) {
                Some(info) => self.reconcile_container(info).await,
                None => debug!(id, "skipping malformed container inspect response"),
            },
            Err(e) => warn!(id, error = %e, "failed to inspect container"),
        }
    }

    async fn reconcile_container(&self, info: ContainerInfo) {
        let resolved = {
            let mut writer = self.graph.write();
            try_reconcile(&mut writer, &self.root, &info)
        };
        if !resolved {
            self.pending.lock().await.insert(info.id.clone(), info);
        } else {
            self.pending.lock().await.remove(&info.id);
        }
    }

    /// Re-attempt every pending container's correlation under one write
    /// lock, the same composite-lookup-then-mutate discipline every other
    /// probe uses for its own deferred-linking pattern (§5).
    async fn retry_pending(&self) {
        let items: Vec<ContainerInfo> = {
            let mut pending = self.pending.lock().await;
            if pending.is_empty() {
                return;
            }
            pending.drain().map(|(_, v)| v).collect()
        };

        let mut still_pending = Vec::new();
        {
            let mut writer = self.graph.write();
            for info in items {
                if !try_reconcile(&mut writer, &self.root, &info) {
                    still_pending.push(info);
                }
            }
        }
        if !still_pending.is_empty() {
            let mut pending = self.pending.lock().await;
            for info in still_pending {
                pending.insert(info.id.clone(), info);
            }
        }
    }

    fn remove_container(&self, id: &str) {
        let mut writer = self.graph.write();
        let filter = MetadataFilter::new().with(attr::TYPE, node_type::CONTAINER).with(attr::DOCKER_CONTAINER_ID, id);
        if let Some(node) = writer.lookup_first_node(&filter) {
            writer.del_node(&node.id);
        }
    }

    async fn handle_event(&self, transport: &DockerTransport, event: &Json) {
        if event.get("Type").and_then(Json::as_str) != Some("container") {
            return;
        }
        let Some(action) = event.get("Action").and_then(Json::as_str) else {
            return;
        };
        let Some(id) = event.get("Actor").and_then(|a| a.get("ID")).and_then(Json::as_str) else {
            return;
        };
        match action {
            "start" => self.inspect_and_reconcile(transport, id).await,
            "die" | "destroy" => {
                self.remove_container(id);
                self.pending.lock().await.remove(id);
            }
            _ => {}
        }
    }

    async fn run_session(&self) -> Result<(), DockerError> {
        let transport = DockerTransport::new(&self.socket_path);
        self.initial_sync(&transport).await?;
        let mut stream = transport.events().await?;
        info!(socket = %self.socket_path, "connected to docker daemon");

        while self.lifecycle.should_continue() {
            match timeout(RECV_POLL, stream.next()).await {
                Ok(Ok(Some(event))) => self.handle_event(&transport, &event).await,
                Ok(Ok(None)) => return Err(DockerError::Http("docker event stream closed".to_string())),
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => self.retry_pending().await,
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
                    warn!(error = %err, "docker session ended, reconnecting");
                    sleep(RECONNECT_DELAY).await;
                }
            }
        })
        .await;
    }
}

fn ownership_metadata() -> Metadata {
    Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership)
}

/// Upsert the `container` node for one inspected container, linking it
/// under `parent` (either a `netns` node or, for `--net=host`, the root).
fn upsert_container_node(writer: &mut GraphWriter<'_>, parent: &Identifier, info: &ContainerInfo) -> Node {
    let filter = MetadataFilter::new().with(attr::TYPE, node_type::CONTAINER).with(attr::DOCKER_CONTAINER_ID, info.id.as_str());
    let node = if let Some(existing) = writer.lookup_first_node(&filter) {
        existing
    } else {
        let metadata = Metadata::new()
            .with(attr::TYPE, node_type::CONTAINER)
            .with(attr::DOCKER_CONTAINER_ID, info.id.as_str())
            .with(attr::DOCKER_CONTAINER_NAME, format!("/{}", info.name))
            .with(attr::MANAGER, attr::MANAGER_DOCKER);
        let node = writer.new_node(metadata);
        writer.add_node(node)
    };
    writer.link(parent, &node.id, ownership_metadata());
    node
}

/// Basename of a Docker `SandboxKey` bind-mount path (e.g.
/// `/var/run/docker/netns/1a2b3c` → `1a2b3c`), used to match the `netns`
/// node the namespace probe names after that same mount file.
fn netns_name_from_sandbox_key(sandbox_key: &str) -> &str {
    sandbox_key.rsplit('/').next().unwrap_or(sandbox_key)
}

/// Attempt one container's correlation; returns `false` if the namespace or
/// sibling container it depends on hasn't appeared in the graph yet, in
/// which case the caller queues it for retry (§4.F, §5).
fn try_reconcile(writer: &mut GraphWriter<'_>, root: &Identifier, info: &ContainerInfo) -> bool {
    match &info.network_mode {
        NetworkMode::Host => {
            upsert_container_node(writer, root, info);
            true
        }
        NetworkMode::Own { sandbox_key } => {
            let ns_name = netns_name_from_sandbox_key(sandbox_key);
            let filter = MetadataFilter::new().with(attr::TYPE, node_type::NETNS).with(attr::NAME, ns_name);
            let Some(netns) = writer.lookup_first_node(&filter) else {
                return false;
            };
            writer.merge_node_metadata(&netns.id, &Metadata::new().with(attr::NAME, info.name.as_str()).with(attr::MANAGER, attr::MANAGER_DOCKER));
            upsert_container_node(writer, &netns.id, info);
            true
        }
        NetworkMode::Shared { container_id } => {
            let sibling_filter = MetadataFilter::new().with(attr::TYPE, node_type::CONTAINER).with(attr::DOCKER_CONTAINER_ID, container_id.as_str());
            let Some(sibling) = writer.lookup_first_node(&sibling_filter) else {
                return false;
            };
            let Some(netns) = writer.lookup_parent_nodes(&sibling.id, &MetadataFilter::new().with(attr::TYPE, node_type::NETNS)).into_iter().next() else {
                // The sibling shares the host namespace (--net=host): no
                // netns node to join, so this container does too.
                if writer.are_linked(root, &sibling.id) {
                    upsert_container_node(writer, root, info);
                    return true;
                }
                return false;
            };
            upsert_container_node(writer, &netns.id, info);
            true
        }
    }
}

impl Probe for DockerProbe {
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
                info!("docker probe starting");
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
    use topo_graph::InMemoryBackend;

    fn new_graph() -> Graph {
        Graph::new(Box::new(InMemoryBackend::new()), "test-host")
    }

    fn container(id: &str, name: &str, mode: NetworkMode) -> ContainerInfo {
        ContainerInfo {
            id: id.to_string(),
            name: name.to_string(),
            network_mode: mode,
        }
    }

    #[test]
    fn host_mode_container_is_owned_directly_by_root_with_no_netns() {
        let graph = new_graph();
        let root = graph.root().clone();
        let mut writer = graph.write();

        let info = container("c1", "web-1", NetworkMode::Host);
        assert!(try_reconcile(&mut writer, &root, &info));

        let node = writer.lookup_first_node(&MetadataFilter::new().with(attr::TYPE, node_type::CONTAINER)).unwrap();
        assert!(writer.are_linked(&root, &node.id));
        assert!(writer.lookup_children(&root, &MetadataFilter::new().with(attr::TYPE, node_type::NETNS)).is_empty());
    }

    #[test]
    fn own_namespace_mode_defers_until_the_netns_node_exists_then_renames_it() {
        let graph = new_graph();
        let root = graph.root().clone();
        let mut writer = graph.write();

        let info = container("c1", "web-1", NetworkMode::Own { sandbox_key: "/var/run/docker/netns/abc123".to_string() });
        assert!(!try_reconcile(&mut writer, &root, &info), "netns node not yet present");

        let netns_metadata = Metadata::new().with(attr::TYPE, node_type::NETNS).with(attr::NAME, "abc123");
        let netns = writer.add_node(writer.new_node(netns_metadata));
        writer.link(&root, &netns.id, ownership_metadata());

        assert!(try_reconcile(&mut writer, &root, &info));
        let renamed = writer.get_node(&netns.id).unwrap();
        assert_eq!(renamed.metadata.get_str(attr::NAME), Some("web-1"));
        assert_eq!(renamed.metadata.get_str(attr::MANAGER), Some(attr::MANAGER_DOCKER));

        let container_node = writer.lookup_first_child(&netns.id, &MetadataFilter::new().with(attr::TYPE, node_type::CONTAINER)).unwrap();
        assert_eq!(container_node.metadata.get_str(attr::DOCKER_CONTAINER_NAME), Some("/web-1"));
    }

    #[test]
    fn shared_namespace_mode_joins_the_owning_containers_netns() {
        let graph = new_graph();
        let root = graph.root().clone();
        let mut writer = graph.write();

        let netns = writer.add_node(writer.new_node(Metadata::new().with(attr::TYPE, node_type::NETNS).with(attr::NAME, "web-1")));
        writer.link(&root, &netns.id, ownership_metadata());
        let owner = container("c0", "web-1", NetworkMode::Own { sandbox_key: "/x/web-1".to_string() });
        assert!(try_reconcile(&mut writer, &root, &owner));

        let joiner = container("c1", "sidecar", NetworkMode::Shared { container_id: "c0".to_string() });
        assert!(try_reconcile(&mut writer, &root, &joiner));

        let children = writer.lookup_children(&netns.id, &MetadataFilter::new().with(attr::TYPE, node_type::CONTAINER));
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn removing_a_container_deletes_only_its_own_node() {
        let graph = new_graph();
        let root = graph.root().clone();
        let probe = DockerProbe::new(Arc::new(graph), "/var/run/docker.sock");
        let info = container("c1", "web-1", NetworkMode::Host);
        {
            let mut writer = probe.graph.write();
            try_reconcile(&mut writer, &root, &info);
        }
        probe.remove_container("c1");
        let remaining = probe.graph.read().lookup_nodes(&MetadataFilter::new().with(attr::TYPE, node_type::CONTAINER));
        assert!(remaining.is_empty());
    }
}
