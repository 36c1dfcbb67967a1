use crate::{Identifier, Metadata};
use facet::Facet;

/// A graph node: an identifier plus its metadata bag.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct Node {
    pub id: Identifier,
    pub metadata: Metadata,
}

impl Node {
    pub fn new(id: Identifier, metadata: Metadata) -> Self {
        Self { id, metadata }
    }
}

/// A graph edge: a directed (parent, child) pair plus metadata.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct Edge {
    pub id: Identifier,
    pub parent: Identifier,
    pub child: Identifier,
    pub metadata: Metadata,
}

impl Edge {
    pub fn new(id: Identifier, parent: Identifier, child: Identifier, metadata: Metadata) -> Self {
        Self {
            id,
            parent,
            child,
            metadata,
        }
    }

    /// The (parent, child, `RelationType`) triple that determines edge
    /// equivalence (§4.A "Equality and identity rules").
    pub fn equivalence_key(&self) -> (Identifier, Identifier, Option<&str>) {
        (
            self.parent.clone(),
            self.child.clone(),
            self.metadata.get_str(crate::attr::RELATION_TYPE),
        )
    }
}

/// The reserved values of the `RelationType` edge attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationType {
    /// Structural containment: root→bridge→port→interface, namespace→interface.
    Ownership,
    /// Data-plane adjacency: veth peer, bridge membership, patch peer.
    Layer2,
}

impl RelationType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Ownership => "ownership",
            RelationType::Layer2 => "layer2",
        }
    }
}

impl From<RelationType> for crate::Value {
    fn from(rt: RelationType) -> Self {
        crate::Value::Str(rt.as_str().into())
    }
}
