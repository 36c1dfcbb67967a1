use crate::Backend;
use crate::memory::InMemoryBackend;
use tracing::warn;
use topo_types::{Edge, Identifier, Metadata, Node};

/// The write side of a remote graph-query service (gremlin-over-websocket or
/// gremlin-over-REST). The analyzer/aggregator this talks to is an external
/// collaborator (§1); only its interface is specified here, not its wire
/// protocol.
pub trait RemoteGraphWriter: Send + Sync {
    fn push_node(&self, node: &Node);
    fn push_node_deleted(&self, id: &Identifier);
    fn push_edge(&self, edge: &Edge);
    fn push_edge_deleted(&self, id: &Identifier);
}

/// A writer that only logs — used when no remote endpoint is configured yet,
/// or in tests that only exercise the local read-through cache.
pub struct LoggingRemoteWriter {
    pub backend_url: String,
}

impl RemoteGraphWriter for LoggingRemoteWriter {
    fn push_node(&self, node: &Node) {
        warn!(backend = %self.backend_url, node = %node.id, "external graph backend not wired up; mutation not forwarded");
    }

    fn push_node_deleted(&self, id: &Identifier) {
        warn!(backend = %self.backend_url, node = %id, "external graph backend not wired up; deletion not forwarded");
    }

    fn push_edge(&self, edge: &Edge) {
        warn!(backend = %self.backend_url, edge = %edge.id, "external graph backend not wired up; mutation not forwarded");
    }

    fn push_edge_deleted(&self, id: &Identifier) {
        warn!(backend = %self.backend_url, edge = %id, "external graph backend not wired up; deletion not forwarded");
    }
}

/// Read-through cache + writethrough mutations over a remote graph-query
/// service (§4.A "Supplied implementations"). Reads are served from the
/// local cache (populated lazily as the cache observes writes — enumeration
/// order is therefore not guaranteed to match the remote store, as the spec
/// allows for external backends).
pub struct ExternalBackend {
    cache: InMemoryBackend,
    remote: Box<dyn RemoteGraphWriter>,
}

impl ExternalBackend {
    pub fn new(remote: Box<dyn RemoteGraphWriter>) -> Self {
        Self {
            cache: InMemoryBackend::new(),
            remote,
        }
    }
}

impl Backend for ExternalBackend {
    fn add_node(&self, node: Node) {
        self.remote.push_node(&node);
        self.cache.add_node(node);
    }

    fn del_node(&self, id: &Identifier) -> Option<Node> {
        self.remote.push_node_deleted(id);
        self.cache.del_node(id)
    }

    fn get_node(&self, id: &Identifier) -> Option<Node> {
        self.cache.get_node(id)
    }

    fn set_node_metadata(&self, id: &Identifier, metadata: Metadata) -> Option<Node> {
        let node = self.cache.set_node_metadata(id, metadata)?;
        self.remote.push_node(&node);
        Some(node)
    }

    fn enumerate_nodes(&self) -> Vec<Node> {
        self.cache.enumerate_nodes()
    }

    fn add_edge(&self, edge: Edge) {
        self.remote.push_edge(&edge);
        self.cache.add_edge(edge);
    }

    fn del_edge(&self, id: &Identifier) -> Option<Edge> {
        self.remote.push_edge_deleted(id);
        self.cache.del_edge(id)
    }

    fn get_edge(&self, id: &Identifier) -> Option<Edge> {
        self.cache.get_edge(id)
    }

    fn set_edge_metadata(&self, id: &Identifier, metadata: Metadata) -> Option<Edge> {
        let edge = self.cache.set_edge_metadata(id, metadata)?;
        self.remote.push_edge(&edge);
        Some(edge)
    }

    fn enumerate_edges(&self) -> Vec<Edge> {
        self.cache.enumerate_edges()
    }
}
