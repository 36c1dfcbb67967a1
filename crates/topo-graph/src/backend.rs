use topo_types::{Edge, Identifier, Metadata, Node};

/// Storage seam for the graph (§4.A "Backend abstraction").
///
/// The graph itself owns the parent/child indices and the locking
/// discipline; a backend only needs to durably hold nodes and edges and
/// hand them back on lookup. This is deliberately dumber than the graph's
/// own API — no filters, no cascade — so a new backend only has to get
/// storage right, not graph semantics.
pub trait Backend: Send + Sync {
    fn add_node(&self, node: Node);
    fn del_node(&self, id: &Identifier) -> Option<Node>;
    fn get_node(&self, id: &Identifier) -> Option<Node>;
    fn set_node_metadata(&self, id: &Identifier, metadata: Metadata) -> Option<Node>;
    fn enumerate_nodes(&self) -> Vec<Node>;

    fn add_edge(&self, edge: Edge);
    fn del_edge(&self, id: &Identifier) -> Option<Edge>;
    fn get_edge(&self, id: &Identifier) -> Option<Edge>;
    fn set_edge_metadata(&self, id: &Identifier, metadata: Metadata) -> Option<Edge>;
    fn enumerate_edges(&self) -> Vec<Edge>;
}
