//! `onLinkAdded`/`onLinkDeleted` (§4.C): pure translation from a
//! [`KernelLink`] to graph mutations. Takes a [`GraphWriter`] rather than a
//! [`LinkSource`] so it is unit-testable without a kernel — the probe loop
//! (`probe.rs`) is the only place that awaits on `LinkSource`.

use topo_graph::GraphWriter;
use topo_types::{Identifier, Metadata, MetadataFilter, Node, RelationType, attr, node_type};

use crate::link_source::KernelLink;
use crate::queue::DeferredQueue;

/// The well-known OVS kernel interface, semantically noise (§4.C "default
/// (generic)").
pub const OVS_SYSTEM_IFACE: &str = "ovs-system";

/// What the probe loop must still do after a synchronous `on_link_added` —
/// namely, resolve the veth peer, which requires an ethtool ioctl.
pub struct AddOutcome {
    pub node_id: Option<Identifier>,
    pub is_veth: bool,
}

impl AddOutcome {
    fn skipped() -> Self {
        Self {
            node_id: None,
            is_veth: false,
        }
    }
}

fn ownership_metadata() -> Metadata {
    Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership)
}

fn layer2_metadata() -> Metadata {
    Metadata::new().with(attr::RELATION_TYPE, RelationType::Layer2)
}

/// The veth-pair layer2 edge carries an extra `Type=veth` marker
/// (§4.C "Veth peer").
pub fn veth_layer2_metadata() -> Metadata {
    layer2_metadata().with(attr::TYPE, node_type::VETH)
}

/// Build the metadata a link translates to, independent of reconciliation
/// (§4.C "Translation (onLinkAdded)").
pub fn metadata_for(link: &KernelLink) -> Metadata {
    let mut md = Metadata::new()
        .with(attr::NAME, link.name.as_str())
        .with(attr::TYPE, link_type_str(link))
        .with(attr::IF_INDEX, link.index as i64)
        .with(
            attr::STATE,
            if link.up { attr::STATE_UP } else { attr::STATE_DOWN },
        );

    if let Some(mac) = &link.mac {
        md.set(attr::MAC, mac.as_str());
    }
    if let Some(mtu) = link.mtu {
        md.set(attr::MTU, mtu as i64);
    }
    if !link.ipv4.is_empty() {
        md.set(attr::IPV4, link.ipv4.as_str());
    }
    if let Some(vlan) = link.vlan_id {
        md.set(attr::VLAN, vlan);
    }
    if let Some(mode) = &link.bond_mode {
        md.set(attr::BOND_MODE, mode.as_str());
    }

    let driver = if link.driver.is_empty() && link.kind == node_type::BRIDGE {
        attr::DRIVER_BRIDGE
    } else {
        link.driver.as_str()
    };
    if !driver.is_empty() {
        md.set(attr::DRIVER, driver);
    }

    md
}

fn link_type_str(link: &KernelLink) -> &str {
    if link.kind.is_empty() {
        node_type::DEVICE
    } else {
        link.kind.as_str()
    }
}

fn by_name_and_ifindex(link: &KernelLink) -> MetadataFilter {
    MetadataFilter::new()
        .with(attr::NAME, link.name.as_str())
        .with(attr::IF_INDEX, link.index as i64)
}

fn by_name_and_ovs_driver(link: &KernelLink) -> MetadataFilter {
    MetadataFilter::new()
        .with(attr::NAME, link.name.as_str())
        .with(attr::DRIVER, attr::DRIVER_OPENVSWITCH)
}

fn by_ifindex(link: &KernelLink) -> MetadataFilter {
    MetadataFilter::new().with(attr::IF_INDEX, link.index as i64)
}

fn find_ovs_owned_member(writer: &GraphWriter<'_>, link: &KernelLink) -> Option<Node> {
    let filter = MetadataFilter::new()
        .with(attr::NAME, link.name.as_str())
        .with(attr::IF_INDEX, link.index as i64);
    writer
        .lookup_nodes(&filter)
        .into_iter()
        .find(|n| n.metadata.contains_key(attr::UUID))
}

fn find_or_create_child(
    writer: &mut GraphWriter<'_>,
    root: &Identifier,
    filter: &MetadataFilter,
    incoming: &Metadata,
) -> (Node, bool) {
    if let Some(existing) = writer.lookup_first_child(root, filter) {
        (existing, true)
    } else {
        let node = writer.new_node(incoming.clone());
        (writer.add_node(node), false)
    }
}

fn find_or_create_any(
    writer: &mut GraphWriter<'_>,
    filter: &MetadataFilter,
    incoming: &Metadata,
) -> (Node, bool) {
    if let Some(existing) = writer.lookup_first_node(filter) {
        (existing, true)
    } else {
        let node = writer.new_node(incoming.clone());
        (writer.add_node(node), false)
    }
}

fn apply_metadata_delta(writer: &mut GraphWriter<'_>, node: &mut Node, incoming: &Metadata) {
    let delta = node.metadata.delta(incoming);
    if delta.is_empty() {
        return;
    }
    writer.merge_node_metadata(&node.id, &delta);
    if let Some(refreshed) = writer.get_node(&node.id) {
        *node = refreshed;
    }
}

fn reconcile_bridge_membership(
    writer: &mut GraphWriter<'_>,
    root: &Identifier,
    queue: &mut DeferredQueue,
    node_id: &Identifier,
    link: &KernelLink,
) {
    let Some(master_index) = link.master_index else {
        return;
    };
    let filter = by_ifindex_value(master_index);
    match writer.lookup_first_child(root, &filter) {
        Some(master) => {
            if master.metadata.get_str(attr::NAME) == Some(OVS_SYSTEM_IFACE) {
                return;
            }
            writer.link(&master.id, node_id, layer2_metadata());
        }
        None => queue.push(master_index, node_id.clone(), link.index),
    }
}

fn by_ifindex_value(index: u32) -> MetadataFilter {
    MetadataFilter::new().with(attr::IF_INDEX, index as i64)
}

/// `onLinkAdded` (§4.C). Returns what, if anything, the probe loop must do
/// next with kernel I/O (the veth peer resolution).
pub fn on_link_added(
    writer: &mut GraphWriter<'_>,
    root: &Identifier,
    queue: &mut DeferredQueue,
    link: &KernelLink,
) -> AddOutcome {
    let incoming = metadata_for(link);
    let driver = incoming.get_str(attr::DRIVER).unwrap_or("").to_string();

    if link.name == OVS_SYSTEM_IFACE && driver != attr::DRIVER_BRIDGE && driver != attr::DRIVER_OPENVSWITCH {
        return AddOutcome::skipped();
    }

    let (mut node, preexisted) = match driver.as_str() {
        attr::DRIVER_BRIDGE => find_or_create_child(writer, root, &by_name_and_ifindex(link), &incoming),
        attr::DRIVER_OPENVSWITCH => find_or_create_any(writer, &by_name_and_ovs_driver(link), &incoming),
        _ => {
            if let Some(existing) = writer.lookup_first_child(root, &by_ifindex(link)) {
                (existing, true)
            } else if let Some(existing) = find_ovs_owned_member(writer, link) {
                (existing, true)
            } else {
                let node = writer.new_node(incoming.clone());
                (writer.add_node(node), false)
            }
        }
    };

    writer.link(root, &node.id, ownership_metadata());

    let delta_source = if driver == attr::DRIVER_OPENVSWITCH && preexisted {
        // OVSDB is authoritative for Type among the interfaces it owns.
        let mut adjusted = incoming.clone();
        if let Some(existing_type) = node.metadata.get(attr::TYPE).cloned() {
            adjusted.set(attr::TYPE, existing_type);
        }
        adjusted
    } else {
        incoming.clone()
    };

    if preexisted {
        apply_metadata_delta(writer, &mut node, &delta_source);
    }

    if driver == attr::DRIVER_BRIDGE {
        for child_id in queue.take(link.index) {
            writer.link(&node.id, &child_id, layer2_metadata());
        }
    }

    reconcile_bridge_membership(writer, root, queue, &node.id, link);

    AddOutcome {
        node_id: Some(node.id),
        is_veth: link.kind == node_type::VETH,
    }
}

/// `onLinkDeleted` (§4.C). `still_present` tells it whether the kernel
/// still has this ifindex (a bridge-member removal, not a real deletion) —
/// that check requires kernel I/O and is done by the caller.
pub fn on_link_deleted(
    writer: &mut GraphWriter<'_>,
    root: &Identifier,
    queue: &mut DeferredQueue,
    index: u32,
    still_present: bool,
) {
    let filter = by_ifindex_value(index);
    let candidates = writer.lookup_nodes(&filter);

    let candidate = match candidates.len() {
        0 => None,
        1 => candidates.into_iter().next(),
        _ => writer
            .lookup_first_child(root, &filter)
            .or_else(|| candidates.into_iter().next()),
    };

    queue.drop_master(index);
    queue.tombstone_child(index);

    let Some(candidate) = candidate else {
        return;
    };

    if still_present {
        let parents = writer.lookup_parent_nodes(&candidate.id, &MetadataFilter::new());
        for parent in parents {
            if parent.metadata.get_str(attr::TYPE) == Some(node_type::BRIDGE) {
                writer.unlink(&parent.id, &candidate.id);
            }
        }
        return;
    }

    if candidate.metadata.get_str(attr::DRIVER) == Some(attr::DRIVER_OPENVSWITCH) {
        writer.unlink(root, &candidate.id);
    } else {
        writer.del_node(&candidate.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_graph::{Graph, InMemoryBackend};

    fn new_link(index: u32, name: &str, kind: &str) -> KernelLink {
        KernelLink {
            index,
            name: name.into(),
            kind: kind.into(),
            mac: None,
            mtu: Some(1500),
            ipv4: String::new(),
            up: true,
            master_index: None,
            vlan_id: None,
            bond_mode: None,
            driver: String::new(),
        }
    }

    fn new_graph() -> Graph {
        Graph::new(Box::new(InMemoryBackend::new()), "test-host")
    }

    #[test]
    fn generic_link_is_created_and_owned_by_root() {
        let g = new_graph();
        let mut writer = g.write();
        let mut queue = DeferredQueue::new();
        let root = g.root().clone();

        let link = new_link(5, "eth0", "");
        let outcome = on_link_added(&mut writer, &root, &mut queue, &link);
        let node_id = outcome.node_id.expect("node created");
        assert!(writer.are_linked(&root, &node_id));
        let node = writer.get_node(&node_id).unwrap();
        assert_eq!(node.metadata.get_str(attr::NAME), Some("eth0"));
        assert_eq!(node.metadata.get_str(attr::TYPE), Some(node_type::DEVICE));
    }

    #[test]
    fn ovs_system_is_skipped() {
        let g = new_graph();
        let mut writer = g.write();
        let mut queue = DeferredQueue::new();
        let root = g.root().clone();

        let link = new_link(9, OVS_SYSTEM_IFACE, "");
        let outcome = on_link_added(&mut writer, &root, &mut queue, &link);
        assert!(outcome.node_id.is_none());
        assert!(writer.lookup_nodes(&MetadataFilter::new()).len() == 1, "only the root node exists");
    }

    #[test]
    fn bridge_creation_consumes_deferred_children() {
        let g = new_graph();
        let mut writer = g.write();
        let mut queue = DeferredQueue::new();
        let root = g.root().clone();

        let child_node = writer.add_node(writer.new_node(Metadata::new().with(attr::NAME, "eth1")));
        queue.push(10, child_node.id.clone(), 7);

        let bridge_link = new_link(10, "br0", node_type::BRIDGE);
        let outcome = on_link_added(&mut writer, &root, &mut queue, &bridge_link);
        let bridge_id = outcome.node_id.unwrap();

        assert!(writer.are_linked(&bridge_id, &child_node.id));
        assert!(queue.take(10).is_empty());
    }

    #[test]
    fn bridge_member_queued_when_master_not_yet_present() {
        let g = new_graph();
        let mut writer = g.write();
        let mut queue = DeferredQueue::new();
        let root = g.root().clone();

        let mut member = new_link(3, "eth2", "");
        member.master_index = Some(99);
        let outcome = on_link_added(&mut writer, &root, &mut queue, &member);
        let member_id = outcome.node_id.unwrap();

        let waiting = queue.take(99);
        assert_eq!(waiting, vec![member_id]);
    }

    #[test]
    fn openvswitch_branch_preserves_existing_type() {
        let g = new_graph();
        let mut writer = g.write();
        let mut queue = DeferredQueue::new();
        let root = g.root().clone();

        let existing = writer.add_node(writer.new_node(
            Metadata::new()
                .with(attr::NAME, "ovs0")
                .with(attr::TYPE, node_type::PATCH)
                .with(attr::DRIVER, attr::DRIVER_OPENVSWITCH)
                .with(attr::IF_INDEX, 4i64),
        ));

        let mut link = new_link(4, "ovs0", "");
        link.driver = attr::DRIVER_OPENVSWITCH.to_string();
        on_link_added(&mut writer, &root, &mut queue, &link);

        let refreshed = writer.get_node(&existing.id).unwrap();
        assert_eq!(refreshed.metadata.get_str(attr::TYPE), Some(node_type::PATCH));
    }

    #[test]
    fn deletion_of_present_interface_unlinks_bridge_membership_only() {
        let g = new_graph();
        let mut writer = g.write();
        let mut queue = DeferredQueue::new();
        let root = g.root().clone();

        let bridge = writer.add_node(writer.new_node(
            Metadata::new().with(attr::NAME, "br0").with(attr::TYPE, node_type::BRIDGE),
        ));
        let member = writer.add_node(writer.new_node(
            Metadata::new().with(attr::NAME, "eth3").with(attr::IF_INDEX, 11i64),
        ));
        writer.link(&root, &member.id, ownership_metadata());
        writer.link(&bridge.id, &member.id, layer2_metadata());

        on_link_deleted(&mut writer, &root, &mut queue, 11, true);

        assert!(!writer.are_linked(&bridge.id, &member.id));
        assert!(writer.get_node(&member.id).is_some(), "member itself survives");
    }

    #[test]
    fn deletion_of_gone_interface_removes_the_node() {
        let g = new_graph();
        let mut writer = g.write();
        let mut queue = DeferredQueue::new();
        let root = g.root().clone();

        let node = writer.add_node(writer.new_node(
            Metadata::new().with(attr::NAME, "eth4").with(attr::IF_INDEX, 12i64),
        ));
        writer.link(&root, &node.id, ownership_metadata());

        on_link_deleted(&mut writer, &root, &mut queue, 12, false);
        assert!(writer.get_node(&node.id).is_none());
    }

    #[test]
    fn deletion_of_gone_ovs_owned_interface_only_unlinks_root() {
        let g = new_graph();
        let mut writer = g.write();
        let mut queue = DeferredQueue::new();
        let root = g.root().clone();

        let node = writer.add_node(writer.new_node(
            Metadata::new()
                .with(attr::NAME, "p0")
                .with(attr::DRIVER, attr::DRIVER_OPENVSWITCH)
                .with(attr::IF_INDEX, 13i64),
        ));
        writer.link(&root, &node.id, ownership_metadata());

        on_link_deleted(&mut writer, &root, &mut queue, 13, false);
        assert!(writer.get_node(&node.id).is_some(), "OVSDB probe owns deletion");
        assert!(!writer.are_linked(&root, &node.id));
    }
}
