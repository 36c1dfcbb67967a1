use std::collections::HashMap;
use topo_types::Identifier;

/// `indexToChildrenQueue` (§4.C, DESIGN NOTES "Deferred linking"): children
/// discovered before their bridge/bond master, keyed by the master's
/// kernel ifindex. Ephemeral — consumed when the master appears, tombstoned
/// when the child disappears first.
#[derive(Default)]
pub struct DeferredQueue {
    by_master: HashMap<u32, Vec<(Identifier, u32)>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `child` (with its own ifindex, for later tombstoning) under
    /// `master_index`.
    pub fn push(&mut self, master_index: u32, child: Identifier, child_ifindex: u32) {
        self.by_master
            .entry(master_index)
            .or_default()
            .push((child, child_ifindex));
    }

    /// Drain every child waiting on `master_index` — called once the master
    /// node has been created/found.
    pub fn take(&mut self, master_index: u32) -> Vec<Identifier> {
        self.by_master
            .remove(&master_index)
            .unwrap_or_default()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Drop the whole queue for a master that is itself going away
    /// (§4.C "onLinkDeleted": "drop any deferred-children queue keyed by
    /// this index").
    pub fn drop_master(&mut self, master_index: u32) {
        self.by_master.remove(&master_index);
    }

    /// Prune any entry for a child that was deleted before its master
    /// appeared (DESIGN NOTES: "must handle the child's deletion-before-
    /// parent-appears case").
    pub fn tombstone_child(&mut self, child_ifindex: u32) {
        for entries in self.by_master.values_mut() {
            entries.retain(|(_, ifindex)| *ifindex != child_ifindex);
        }
        self.by_master.retain(|_, v| !v.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_drains_only_the_requested_master() {
        let mut q = DeferredQueue::new();
        q.push(10, Identifier::new("a"), 1);
        q.push(10, Identifier::new("b"), 2);
        q.push(20, Identifier::new("c"), 3);

        let drained = q.take(10);
        assert_eq!(drained, vec![Identifier::new("a"), Identifier::new("b")]);
        assert!(q.take(10).is_empty());
        assert_eq!(q.take(20), vec![Identifier::new("c")]);
    }

    #[test]
    fn tombstone_removes_only_the_matching_child() {
        let mut q = DeferredQueue::new();
        q.push(10, Identifier::new("a"), 1);
        q.push(10, Identifier::new("b"), 2);

        q.tombstone_child(1);
        assert_eq!(q.take(10), vec![Identifier::new("b")]);
    }

    #[test]
    fn drop_master_removes_the_whole_entry() {
        let mut q = DeferredQueue::new();
        q.push(10, Identifier::new("a"), 1);
        q.drop_master(10);
        assert!(q.take(10).is_empty());
    }
}
