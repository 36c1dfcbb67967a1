use compact_str::CompactString;
use facet::Facet;
use topo_types::{Edge, Metadata, Node};

/// Wire shape of a node (§6 "Node JSON shape"). Distinct from
/// [`topo_types::Node`] because `Host` is injected at publish time and is
/// not part of the graph's own data model.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct WireNode {
    #[facet(rename = "ID")]
    pub id: CompactString,
    #[facet(rename = "Metadata")]
    pub metadata: Metadata,
    #[facet(rename = "Host")]
    pub host: CompactString,
}

impl WireNode {
    pub fn from_node(node: &Node, host: &str) -> Self {
        Self {
            id: node.id.as_str().into(),
            metadata: node.metadata.clone(),
            host: host.into(),
        }
    }
}

/// Wire shape of an edge (§6 "Edge JSON shape").
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct WireEdge {
    #[facet(rename = "ID")]
    pub id: CompactString,
    #[facet(rename = "Parent")]
    pub parent: CompactString,
    #[facet(rename = "Child")]
    pub child: CompactString,
    #[facet(rename = "Metadata")]
    pub metadata: Metadata,
    #[facet(rename = "Host")]
    pub host: CompactString,
}

impl WireEdge {
    pub fn from_edge(edge: &Edge, host: &str) -> Self {
        Self {
            id: edge.id.as_str().into(),
            parent: edge.parent.as_str().into(),
            child: edge.child.as_str().into(),
            metadata: edge.metadata.clone(),
            host: host.into(),
        }
    }
}
