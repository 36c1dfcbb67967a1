use crate::Backend;
use std::collections::HashMap;
use topo_types::{Edge, Identifier, MetadataFilter, Node};

/// The graph's private state behind its `RwLock`: the backend plus the two
/// adjacency indices (DESIGN NOTES "Cyclic references" — edges are
/// first-class, nodes do not embed pointers to neighbours).
pub(crate) struct Inner {
    pub(crate) backend: Box<dyn Backend>,
    /// parent node id -> edge ids where that node is the parent
    pub(crate) outgoing: HashMap<Identifier, Vec<Identifier>>,
    /// child node id -> edge ids where that node is the child
    pub(crate) incoming: HashMap<Identifier, Vec<Identifier>>,
}

impl Inner {
    pub(crate) fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    pub(crate) fn get_node(&self, id: &Identifier) -> Option<Node> {
        self.backend.get_node(id)
    }

    pub(crate) fn get_edge(&self, id: &Identifier) -> Option<Edge> {
        self.backend.get_edge(id)
    }

    pub(crate) fn lookup_nodes(&self, filter: &MetadataFilter) -> Vec<Node> {
        self.backend
            .enumerate_nodes()
            .into_iter()
            .filter(|n| n.metadata.matches(filter))
            .collect()
    }

    pub(crate) fn lookup_first_node(&self, filter: &MetadataFilter) -> Option<Node> {
        self.backend
            .enumerate_nodes()
            .into_iter()
            .find(|n| n.metadata.matches(filter))
    }

    pub(crate) fn lookup_children(&self, parent: &Identifier, filter: &MetadataFilter) -> Vec<Node> {
        let Some(edge_ids) = self.outgoing.get(parent) else {
            return Vec::new();
        };
        edge_ids
            .iter()
            .filter_map(|eid| self.get_edge(eid))
            .filter_map(|e| self.get_node(&e.child))
            .filter(|n| n.metadata.matches(filter))
            .collect()
    }

    pub(crate) fn lookup_first_child(
        &self,
        parent: &Identifier,
        filter: &MetadataFilter,
    ) -> Option<Node> {
        let edge_ids = self.outgoing.get(parent)?;
        edge_ids
            .iter()
            .filter_map(|eid| self.get_edge(eid))
            .filter_map(|e| self.get_node(&e.child))
            .find(|n| n.metadata.matches(filter))
    }

    pub(crate) fn lookup_parent_nodes(&self, child: &Identifier, filter: &MetadataFilter) -> Vec<Node> {
        let Some(edge_ids) = self.incoming.get(child) else {
            return Vec::new();
        };
        edge_ids
            .iter()
            .filter_map(|eid| self.get_edge(eid))
            .filter_map(|e| self.get_node(&e.parent))
            .filter(|n| n.metadata.matches(filter))
            .collect()
    }

    pub(crate) fn are_linked(&self, a: &Identifier, b: &Identifier) -> bool {
        self.outgoing
            .get(a)
            .into_iter()
            .flatten()
            .filter_map(|eid| self.get_edge(eid))
            .any(|e| &e.child == b)
            || self
                .outgoing
                .get(b)
                .into_iter()
                .flatten()
                .filter_map(|eid| self.get_edge(eid))
                .any(|e| &e.child == a)
    }

    /// Edge equivalence per §4.A: same (parent, child, `RelationType`).
    pub(crate) fn find_equivalent_edge(
        &self,
        parent: &Identifier,
        child: &Identifier,
        relation_type: Option<&str>,
    ) -> Option<Edge> {
        self.outgoing
            .get(parent)
            .into_iter()
            .flatten()
            .filter_map(|eid| self.get_edge(eid))
            .find(|e| {
                &e.child == child
                    && e.metadata.get_str(topo_types::attr::RELATION_TYPE) == relation_type
            })
    }

    pub(crate) fn index_edge(&mut self, edge: &Edge) {
        self.outgoing
            .entry(edge.parent.clone())
            .or_default()
            .push(edge.id.clone());
        self.incoming
            .entry(edge.child.clone())
            .or_default()
            .push(edge.id.clone());
    }

    pub(crate) fn deindex_edge(&mut self, edge: &Edge) {
        if let Some(list) = self.outgoing.get_mut(&edge.parent) {
            list.retain(|id| id != &edge.id);
        }
        if let Some(list) = self.incoming.get_mut(&edge.child) {
            list.retain(|id| id != &edge.id);
        }
    }

    /// All edges incident to a node, either direction — used by the delete
    /// cascade (Open Question 2: "specify this explicitly").
    pub(crate) fn incident_edges(&self, id: &Identifier) -> Vec<Identifier> {
        let mut ids: Vec<Identifier> = self
            .outgoing
            .get(id)
            .cloned()
            .unwrap_or_default();
        for eid in self.incoming.get(id).into_iter().flatten() {
            if !ids.contains(eid) {
                ids.push(eid.clone());
            }
        }
        ids
    }
}
