use crate::Backend;
use parking_lot::Mutex;
use std::collections::HashMap;
use topo_types::{Edge, Identifier, Metadata, Node};

/// The reference backend (§4.A: "the in-memory backend is the reference").
///
/// Plain `HashMap`s behind a `Mutex` each: the graph's own `RwLock` already
/// serializes every call into this backend during a mutation, so there is
/// no meaningful contention to optimize for here.
#[derive(Default)]
pub struct InMemoryBackend {
    nodes: Mutex<HashMap<Identifier, Node>>,
    edges: Mutex<HashMap<Identifier, Edge>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for InMemoryBackend {
    fn add_node(&self, node: Node) {
        self.nodes.lock().insert(node.id.clone(), node);
    }

    fn del_node(&self, id: &Identifier) -> Option<Node> {
        self.nodes.lock().remove(id)
    }

    fn get_node(&self, id: &Identifier) -> Option<Node> {
        self.nodes.lock().get(id).cloned()
    }

    fn set_node_metadata(&self, id: &Identifier, metadata: Metadata) -> Option<Node> {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(id)?;
        node.metadata = metadata;
        Some(node.clone())
    }

    fn enumerate_nodes(&self) -> Vec<Node> {
        self.nodes.lock().values().cloned().collect()
    }

    fn add_edge(&self, edge: Edge) {
        self.edges.lock().insert(edge.id.clone(), edge);
    }

    fn del_edge(&self, id: &Identifier) -> Option<Edge> {
        self.edges.lock().remove(id)
    }

    fn get_edge(&self, id: &Identifier) -> Option<Edge> {
        self.edges.lock().get(id).cloned()
    }

    fn set_edge_metadata(&self, id: &Identifier, metadata: Metadata) -> Option<Edge> {
        let mut edges = self.edges.lock();
        let edge = edges.get_mut(id)?;
        edge.metadata = metadata;
        Some(edge.clone())
    }

    fn enumerate_edges(&self) -> Vec<Edge> {
        self.edges.lock().values().cloned().collect()
    }
}
