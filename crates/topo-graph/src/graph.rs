use crate::backend::Backend;
use crate::event::Event;
use crate::inner::Inner;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use topo_types::{Edge, Identifier, Metadata, MetadataFilter, Node};

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`Graph::subscribe`] / [`Graph::snapshot_and_subscribe`];
/// pass back to [`Graph::unsubscribe`] to deregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerHandle(u64);

struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, listener: Listener) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, listener));
        ListenerHandle(id)
    }

    fn remove(&self, handle: ListenerHandle) {
        self.entries.lock().retain(|(id, _)| *id != handle.0);
    }

    fn dispatch(&self, event: &Event) {
        for (_, listener) in self.entries.lock().iter() {
            listener(event);
        }
    }
}

/// The topology graph: a single reader/writer lock guarding an adjacency
/// index plus a pluggable storage [`Backend`] (§4.A), with synchronous
/// event dispatch to registered listeners (§4.A "Event dispatch").
///
/// Constructed once per process, at the explicit site documented in
/// `topo-agent`; there is no implicit singleton (DESIGN NOTES "Global state").
pub struct Graph {
    inner: RwLock<Inner>,
    listeners: Listeners,
    root: Identifier,
}

impl Graph {
    /// Construct a graph with the given backend, creating the root host
    /// node (`Type=host`, `Name=hostname`) that persists for the process's
    /// lifetime.
    pub fn new(backend: Box<dyn Backend>, hostname: &str) -> Self {
        let root_metadata = Metadata::new()
            .with(topo_types::attr::TYPE, topo_types::node_type::HOST)
            .with(topo_types::attr::NAME, hostname);
        let root = Node::new(Identifier::fresh(), root_metadata);
        let root_id = root.id.clone();
        backend.add_node(root);

        Self {
            inner: RwLock::new(Inner::new(backend)),
            listeners: Listeners::new(),
            root: root_id,
        }
    }

    pub fn root(&self) -> &Identifier {
        &self.root
    }

    /// Acquire the write lock for the whole of one probe's reconciliation.
    pub fn write(&self) -> GraphWriter<'_> {
        GraphWriter {
            guard: self.inner.write(),
            listeners: &self.listeners,
        }
    }

    /// Acquire the read lock for a sequence of lookups.
    pub fn read(&self) -> GraphReader<'_> {
        GraphReader {
            guard: self.inner.read(),
        }
    }

    /// Register a listener without a snapshot. Prefer
    /// [`Graph::snapshot_and_subscribe`] when a client also needs the
    /// current state, to avoid losing events in the gap between the two.
    pub fn subscribe(&self, listener: Listener) -> ListenerHandle {
        self.listeners.push(listener)
    }

    pub fn unsubscribe(&self, handle: ListenerHandle) {
        self.listeners.remove(handle);
    }

    /// Atomically take a full snapshot and register a listener for
    /// subsequent events, resolving the open question in §9: the snapshot
    /// is read and the listener is registered while the same write lock is
    /// held, so no mutation can land in the gap between the two (the WS
    /// publisher's snapshot-then-subscribe step, §4.G).
    pub fn snapshot_and_subscribe(
        &self,
        listener: Listener,
    ) -> (Vec<Node>, Vec<Edge>, ListenerHandle) {
        let guard = self.inner.write();
        let nodes = guard.backend.enumerate_nodes();
        let edges = guard.backend.enumerate_edges();
        let handle = self.listeners.push(listener);
        drop(guard);
        (nodes, edges, handle)
    }
}

/// A write-locked view of the graph. Holding one across several calls is
/// how a probe makes a composite lookup-then-mutate reconciliation atomic
/// with respect to other probes and the publisher's snapshot (§5).
pub struct GraphWriter<'g> {
    guard: RwLockWriteGuard<'g, Inner>,
    listeners: &'g Listeners,
}

impl GraphWriter<'_> {
    // ---- reads (also available while holding the write lock) ----

    pub fn get_node(&self, id: &Identifier) -> Option<Node> {
        self.guard.get_node(id)
    }

    pub fn get_edge(&self, id: &Identifier) -> Option<Edge> {
        self.guard.get_edge(id)
    }

    pub fn lookup_nodes(&self, filter: &MetadataFilter) -> Vec<Node> {
        self.guard.lookup_nodes(filter)
    }

    pub fn lookup_first_node(&self, filter: &MetadataFilter) -> Option<Node> {
        self.guard.lookup_first_node(filter)
    }

    pub fn lookup_children(&self, parent: &Identifier, filter: &MetadataFilter) -> Vec<Node> {
        self.guard.lookup_children(parent, filter)
    }

    pub fn lookup_first_child(&self, parent: &Identifier, filter: &MetadataFilter) -> Option<Node> {
        self.guard.lookup_first_child(parent, filter)
    }

    pub fn lookup_parent_nodes(&self, child: &Identifier, filter: &MetadataFilter) -> Vec<Node> {
        self.guard.lookup_parent_nodes(child, filter)
    }

    pub fn are_linked(&self, a: &Identifier, b: &Identifier) -> bool {
        self.guard.are_linked(a, b)
    }

    // ---- mutations ----

    /// `NewNode`: builds a node with a fresh identifier. Does not insert it;
    /// follow with `add_node`. Kept as a separate step (rather than folding
    /// fresh-id generation into `add_node`) so callers that need a
    /// deterministic identifier can build a `Node` directly instead.
    pub fn new_node(&self, metadata: Metadata) -> Node {
        Node::new(Identifier::fresh(), metadata)
    }

    /// `AddNode`: a no-op, returning the existing node, if the identifier
    /// is already present (invariant 1).
    pub fn add_node(&mut self, node: Node) -> Node {
        if let Some(existing) = self.guard.get_node(&node.id) {
            return existing;
        }
        self.guard.backend.add_node(node.clone());
        self.listeners.dispatch(&Event::NodeAdded(node.clone()));
        node
    }

    /// `DelNode`: removes the node and, by cascade, every edge incident to
    /// it (Open Question 2, resolved: edges are deleted first, each
    /// dispatching its own `EdgeDeleted`, then the node's `NodeDeleted`).
    /// A no-op if the node does not exist.
    pub fn del_node(&mut self, id: &Identifier) {
        if self.guard.get_node(id).is_none() {
            return;
        }
        for edge_id in self.guard.incident_edges(id) {
            self.del_edge(&edge_id);
        }
        if self.guard.backend.del_node(id).is_some() {
            self.listeners.dispatch(&Event::NodeDeleted(id.clone()));
        }
    }

    /// Delete `id` and, recursively, every node reachable from it via
    /// `ownership` children, top-down. Used where a node's children have no
    /// independent existence without it (an OVSDB bridge's ports and
    /// interfaces, a namespace's containers) — `DelNode` alone only cascades
    /// the node's own incident edges, leaving such children orphaned.
    pub fn del_node_cascade(&mut self, id: &Identifier) {
        for child in self.lookup_children(id, &MetadataFilter::new()) {
            self.del_node_cascade(&child.id);
        }
        self.del_node(id);
    }

    /// `NewEdge`: builds an edge with a fresh identifier; does not insert it.
    pub fn new_edge(&self, parent: Identifier, child: Identifier, metadata: Metadata) -> Edge {
        Edge::new(Identifier::fresh(), parent, child, metadata)
    }

    /// `AddEdge`: a no-op, returning the existing equivalent edge, if an
    /// edge with the same (parent, child, `RelationType`) already exists
    /// (§4.A "Equality and identity rules").
    pub fn add_edge(&mut self, edge: Edge) -> Edge {
        let relation_type = edge.metadata.get_str(topo_types::attr::RELATION_TYPE).map(str::to_owned);
        if let Some(existing) =
            self.guard
                .find_equivalent_edge(&edge.parent, &edge.child, relation_type.as_deref())
        {
            return existing;
        }
        self.guard.backend.add_edge(edge.clone());
        self.guard.index_edge(&edge);
        self.listeners.dispatch(&Event::EdgeAdded(edge.clone()));
        edge
    }

    /// `DelEdge`: a no-op if the edge does not exist.
    pub fn del_edge(&mut self, id: &Identifier) {
        let Some(edge) = self.guard.backend.del_edge(id) else {
            return;
        };
        self.guard.deindex_edge(&edge);
        self.listeners.dispatch(&Event::EdgeDeleted(id.clone()));
    }

    /// `Link`: convenience combining `NewEdge` + `AddEdge`, short-circuiting
    /// to the existing edge when parent/child are already linked with this
    /// `RelationType`.
    pub fn link(&mut self, parent: &Identifier, child: &Identifier, metadata: Metadata) -> Edge {
        let relation_type = metadata.get_str(topo_types::attr::RELATION_TYPE).map(str::to_owned);
        if let Some(existing) =
            self.guard
                .find_equivalent_edge(parent, child, relation_type.as_deref())
        {
            return existing;
        }
        let edge = self.new_edge(parent.clone(), child.clone(), metadata);
        self.add_edge(edge)
    }

    /// `Unlink`: removes every edge directed from `parent` to `child`,
    /// regardless of `RelationType`.
    pub fn unlink(&mut self, parent: &Identifier, child: &Identifier) {
        let ids: Vec<Identifier> = self
            .guard
            .outgoing
            .get(parent)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|eid| {
                self.guard
                    .get_edge(eid)
                    .is_some_and(|e| &e.child == child)
            })
            .collect();
        for id in ids {
            self.del_edge(&id);
        }
    }

    /// `SetMetadata` on a node: replace its metadata wholesale.
    pub fn set_node_metadata(&mut self, id: &Identifier, metadata: Metadata) {
        if let Some(node) = self.guard.backend.set_node_metadata(id, metadata) {
            self.listeners.dispatch(&Event::NodeUpdated(node));
        }
    }

    /// `AddMetadata` on a node: merge in a single key/value.
    pub fn add_node_metadata(&mut self, id: &Identifier, key: &str, value: topo_types::Value) {
        let Some(mut node) = self.guard.get_node(id) else {
            return;
        };
        node.metadata.set(key, value);
        self.set_node_metadata(id, node.metadata);
    }

    /// Merge a metadata delta onto a node (used by the netlink probe's
    /// reconciliation pass); a no-op dispatching nothing if `delta` is empty.
    pub fn merge_node_metadata(&mut self, id: &Identifier, delta: &Metadata) {
        if delta.is_empty() {
            return;
        }
        let Some(mut node) = self.guard.get_node(id) else {
            return;
        };
        node.metadata.merge(delta);
        self.set_node_metadata(id, node.metadata);
    }

    /// `SetMetadata` on an edge: replace its metadata wholesale.
    pub fn set_edge_metadata(&mut self, id: &Identifier, metadata: Metadata) {
        if let Some(edge) = self.guard.backend.set_edge_metadata(id, metadata) {
            self.listeners.dispatch(&Event::EdgeUpdated(edge));
        }
    }
}

/// A read-locked view of the graph, for sequences of lookups that need a
/// consistent view but perform no mutation (e.g. the HTTP health endpoint).
pub struct GraphReader<'g> {
    guard: RwLockReadGuard<'g, Inner>,
}

impl GraphReader<'_> {
    pub fn get_node(&self, id: &Identifier) -> Option<Node> {
        self.guard.get_node(id)
    }

    pub fn get_edge(&self, id: &Identifier) -> Option<Edge> {
        self.guard.get_edge(id)
    }

    pub fn lookup_nodes(&self, filter: &MetadataFilter) -> Vec<Node> {
        self.guard.lookup_nodes(filter)
    }

    pub fn lookup_first_node(&self, filter: &MetadataFilter) -> Option<Node> {
        self.guard.lookup_first_node(filter)
    }

    pub fn lookup_children(&self, parent: &Identifier, filter: &MetadataFilter) -> Vec<Node> {
        self.guard.lookup_children(parent, filter)
    }

    pub fn lookup_first_child(&self, parent: &Identifier, filter: &MetadataFilter) -> Option<Node> {
        self.guard.lookup_first_child(parent, filter)
    }

    pub fn lookup_parent_nodes(&self, child: &Identifier, filter: &MetadataFilter) -> Vec<Node> {
        self.guard.lookup_parent_nodes(child, filter)
    }

    pub fn are_linked(&self, a: &Identifier, b: &Identifier) -> bool {
        self.guard.are_linked(a, b)
    }

    pub fn enumerate_nodes(&self) -> Vec<Node> {
        self.guard.backend.enumerate_nodes()
    }

    pub fn enumerate_edges(&self) -> Vec<Edge> {
        self.guard.backend.enumerate_edges()
    }
}
