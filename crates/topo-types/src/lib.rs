//! Shared vocabulary for the topology graph: nodes, edges, and the open
//! metadata map that carries their attributes.
//!
//! A **node** is an opaque [`Identifier`] plus a [`Metadata`] bag. A small
//! set of attribute names are reserved (see [`attr`]) and given meaning by
//! the probes and the publisher, but the map itself has no schema — this
//! lets a new probe introduce its own namespaced keys (`Docker.ContainerName`)
//! without touching this crate.
//!
//! An **edge** is a directed (parent, child) pair, also identified and also
//! carrying metadata; the one reserved key, [`attr::RELATION_TYPE`], tells
//! readers whether the edge is structural containment (`ownership`) or a
//! data-plane adjacency (`layer2`).

mod ident;
mod metadata;
mod model;

pub mod attr;
pub mod node_type;

pub use ident::Identifier;
pub use metadata::{Metadata, MetadataFilter, Value};
pub use model::{Edge, Node, RelationType};
