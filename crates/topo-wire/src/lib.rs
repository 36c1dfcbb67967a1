//! The websocket wire protocol (§6 "External interfaces"): a namespaced
//! JSON envelope carrying graph snapshot and mutation events.

use compact_str::CompactString;
use facet::Facet;
use topo_types::{Edge, Node};

mod error;
mod node_edge;

pub use error::WireError;
pub use node_edge::{WireEdge, WireNode};

/// The outer message shape every websocket frame carries.
///
/// Field names are capitalized to match the wire shape in §6 verbatim
/// (`{"Namespace": ..., "Type": ..., "Obj": ..., "UUID": ..., "Status": ...}`),
/// independent of Rust's own naming convention for the struct fields.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct Envelope {
    #[facet(rename = "Namespace")]
    pub namespace: CompactString,
    #[facet(rename = "Type")]
    pub kind: CompactString,
    #[facet(rename = "Obj")]
    pub obj: facet_value::Value,
    #[facet(rename = "UUID")]
    pub uuid: CompactString,
    #[facet(rename = "Status")]
    pub status: i64,
}

/// The `Graph` namespace, recognized by every subscriber (§6).
pub const NAMESPACE_GRAPH: &str = "Graph";

pub const TYPE_SYNC_REPLY: &str = "SyncReply";
pub const TYPE_NODE_ADDED: &str = "NodeAdded";
pub const TYPE_NODE_UPDATED: &str = "NodeUpdated";
pub const TYPE_NODE_DELETED: &str = "NodeDeleted";
pub const TYPE_EDGE_ADDED: &str = "EdgeAdded";
pub const TYPE_EDGE_UPDATED: &str = "EdgeUpdated";
pub const TYPE_EDGE_DELETED: &str = "EdgeDeleted";

/// `Obj` payload of a `SyncReply`: the full node/edge set at subscribe time.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct SyncReplyObj {
    #[facet(rename = "Nodes")]
    pub nodes: Vec<WireNode>,
    #[facet(rename = "Edges")]
    pub edges: Vec<WireEdge>,
}

/// `Obj` payload of `NodeDeleted`/`EdgeDeleted`: just the identifier.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct DeletedObj {
    #[facet(rename = "ID")]
    pub id: CompactString,
}

impl Envelope {
    fn new(kind: &str, obj: facet_value::Value) -> Self {
        Self {
            namespace: NAMESPACE_GRAPH.into(),
            kind: kind.into(),
            obj,
            uuid: CompactString::default(),
            status: 0,
        }
    }

    pub fn sync_reply(nodes: &[Node], edges: &[Edge], host: &str) -> Self {
        let obj = SyncReplyObj {
            nodes: nodes.iter().map(|n| WireNode::from_node(n, host)).collect(),
            edges: edges.iter().map(|e| WireEdge::from_edge(e, host)).collect(),
        };
        Self::new(TYPE_SYNC_REPLY, to_value(&obj))
    }

    pub fn node_added(node: &Node, host: &str) -> Self {
        Self::new(TYPE_NODE_ADDED, to_value(&WireNode::from_node(node, host)))
    }

    pub fn node_updated(node: &Node, host: &str) -> Self {
        Self::new(TYPE_NODE_UPDATED, to_value(&WireNode::from_node(node, host)))
    }

    pub fn node_deleted(id: &topo_types::Identifier) -> Self {
        Self::new(
            TYPE_NODE_DELETED,
            to_value(&DeletedObj {
                id: id.as_str().into(),
            }),
        )
    }

    pub fn edge_added(edge: &Edge, host: &str) -> Self {
        Self::new(TYPE_EDGE_ADDED, to_value(&WireEdge::from_edge(edge, host)))
    }

    pub fn edge_updated(edge: &Edge, host: &str) -> Self {
        Self::new(TYPE_EDGE_UPDATED, to_value(&WireEdge::from_edge(edge, host)))
    }

    pub fn edge_deleted(id: &topo_types::Identifier) -> Self {
        Self::new(
            TYPE_EDGE_DELETED,
            to_value(&DeletedObj {
                id: id.as_str().into(),
            }),
        )
    }

    /// Serialize to the exact bytes sent as one websocket text frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        facet_json::to_string(self).map_err(|e| WireError::Encode(e.to_string()))
    }
}

fn to_value<T: facet::Facet<'static>>(value: &T) -> facet_value::Value {
    facet_value::to_value(value).expect("wire DTOs always convert to Value")
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_types::{Identifier, Metadata};

    #[test]
    fn sync_reply_carries_namespace_and_type() {
        let node = Node::new(Identifier::new("n1"), Metadata::new().with("Type", "host"));
        let env = Envelope::sync_reply(std::slice::from_ref(&node), &[], "myhost");
        assert_eq!(env.namespace, "Graph");
        assert_eq!(env.kind, TYPE_SYNC_REPLY);
        let json = env.to_json().expect("should serialize");
        assert!(json.contains("\"Namespace\":\"Graph\""));
        assert!(json.contains("\"Type\":\"SyncReply\""));
    }

    #[test]
    fn node_deleted_carries_bare_id() {
        let env = Envelope::node_deleted(&Identifier::new("n1"));
        assert_eq!(env.kind, TYPE_NODE_DELETED);
    }
}
