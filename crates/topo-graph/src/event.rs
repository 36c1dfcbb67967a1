use topo_types::{Edge, Identifier, Node};

/// A single applied mutation, in the order it was applied (§4.A "Event dispatch").
#[derive(Clone, Debug)]
pub enum Event {
    NodeAdded(Node),
    NodeUpdated(Node),
    NodeDeleted(Identifier),
    EdgeAdded(Edge),
    EdgeUpdated(Edge),
    EdgeDeleted(Identifier),
}
