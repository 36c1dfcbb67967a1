//! The topology graph store (§4.A): a concurrently-mutable, typed graph of
//! nodes and edges with event dispatch to listeners and a pluggable storage
//! backend.
//!
//! Probes (in sibling crates) hold a [`Graph::write`] guard for the whole of
//! one external event's reconciliation; the WS publisher (`topo-web`) takes
//! a snapshot and subscribes atomically via
//! [`Graph::snapshot_and_subscribe`].

mod backend;
mod event;
mod external;
mod graph;
mod inner;
pub mod memory;

pub use backend::Backend;
pub use event::Event;
pub use external::{ExternalBackend, LoggingRemoteWriter, RemoteGraphWriter};
pub use graph::{Graph, GraphReader, GraphWriter, Listener, ListenerHandle};
pub use memory::InMemoryBackend;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use topo_types::{Identifier, Metadata, MetadataFilter, RelationType, attr, node_type};

    fn new_graph() -> Graph {
        Graph::new(Box::new(InMemoryBackend::new()), "test-host")
    }

    #[test]
    fn root_node_exists_with_host_type() {
        let g = new_graph();
        let root = g.read().get_node(g.root()).expect("root node exists");
        assert_eq!(root.metadata.get_str(attr::TYPE), Some(node_type::HOST));
    }

    #[test]
    fn adding_existing_node_id_is_a_no_op_and_dispatches_nothing() {
        let g = new_graph();
        let events: std::sync::Arc<Mutex<Vec<Event>>> = Default::default();
        let events_clone = events.clone();
        g.subscribe(std::sync::Arc::new(move |e: &Event| {
            events_clone.lock().unwrap().push(e.clone());
        }));

        let mut w = g.write();
        let node = w.new_node(Metadata::new().with(attr::TYPE, node_type::BRIDGE));
        let first = w.add_node(node.clone());
        let second = w.add_node(node.clone());
        assert_eq!(first.id, second.id);
        drop(w);

        let dispatched = events.lock().unwrap();
        assert_eq!(dispatched.len(), 1, "only the first AddNode dispatches an event");
    }

    #[test]
    fn linking_already_linked_endpoints_is_a_no_op() {
        let g = new_graph();
        let mut w = g.write();
        let a = w.add_node(w.new_node(Metadata::new()));
        let b = w.add_node(w.new_node(Metadata::new()));
        let e1 = w.link(&a.id, &b.id, Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership));
        let e2 = w.link(&a.id, &b.id, Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership));
        assert_eq!(e1.id, e2.id);
    }

    #[test]
    fn at_most_one_edge_per_parent_child_relation_triple() {
        let g = new_graph();
        let mut w = g.write();
        let a = w.add_node(w.new_node(Metadata::new()));
        let b = w.add_node(w.new_node(Metadata::new()));
        w.link(&a.id, &b.id, Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership));
        w.link(&a.id, &b.id, Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership));
        let children = w.lookup_children(&a.id, &MetadataFilter::new());
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn deleting_nonexistent_node_or_edge_is_a_no_op() {
        let g = new_graph();
        let mut w = g.write();
        w.del_node(&Identifier::new("does-not-exist"));
        w.del_edge(&Identifier::new("does-not-exist"));
    }

    #[test]
    fn deleting_a_node_cascades_its_incident_edges() {
        let g = new_graph();
        let mut w = g.write();
        let a = w.add_node(w.new_node(Metadata::new()));
        let b = w.add_node(w.new_node(Metadata::new()));
        w.link(&a.id, &b.id, Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership));
        assert!(w.are_linked(&a.id, &b.id));

        w.del_node(&b.id);
        assert!(w.get_node(&b.id).is_none());
        assert!(!w.are_linked(&a.id, &b.id));
    }

    #[test]
    fn metadata_update_merges_and_keeps_unmentioned_keys() {
        let g = new_graph();
        let mut w = g.write();
        let node = w.add_node(
            w.new_node(Metadata::new().with(attr::NAME, "eth0").with(attr::MTU, 1500i64)),
        );
        w.merge_node_metadata(&node.id, &Metadata::new().with(attr::MTU, 9000i64));
        let updated = w.get_node(&node.id).unwrap();
        assert_eq!(updated.metadata.get_str(attr::NAME), Some("eth0"));
        assert_eq!(updated.metadata.get_int(attr::MTU), Some(9000));
    }

    #[test]
    fn snapshot_and_subscribe_observes_every_event_after_the_snapshot() {
        let g = new_graph();
        let mut w = g.write();
        let a = w.add_node(w.new_node(Metadata::new().with(attr::NAME, "pre-existing")));
        drop(w);

        let events: std::sync::Arc<Mutex<Vec<Event>>> = Default::default();
        let events_clone = events.clone();
        let (nodes, _edges, _handle) = g.snapshot_and_subscribe(std::sync::Arc::new(move |e: &Event| {
            events_clone.lock().unwrap().push(e.clone());
        }));
        assert!(nodes.iter().any(|n| n.id == a.id));

        let mut w = g.write();
        let b = w.add_node(w.new_node(Metadata::new().with(attr::NAME, "post-subscribe")));
        drop(w);

        let dispatched = events.lock().unwrap();
        assert!(dispatched.iter().any(|e| matches!(e, Event::NodeAdded(n) if n.id == b.id)));
    }

    #[test]
    fn unsubscribed_listener_receives_no_further_events() {
        let g = new_graph();
        let events: std::sync::Arc<Mutex<Vec<Event>>> = Default::default();
        let events_clone = events.clone();
        let handle = g.subscribe(std::sync::Arc::new(move |e: &Event| {
            events_clone.lock().unwrap().push(e.clone());
        }));
        g.unsubscribe(handle);

        let mut w = g.write();
        w.add_node(w.new_node(Metadata::new()));
        drop(w);

        assert!(events.lock().unwrap().is_empty());
    }
}
