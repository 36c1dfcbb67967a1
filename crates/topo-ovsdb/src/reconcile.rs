use topo_graph::GraphWriter;
use topo_types::{Identifier, Metadata, MetadataFilter, Node, RelationType, attr, node_type};

use crate::json::Json;
use crate::rows::{RowCache, RowChange};

pub const TABLE_BRIDGE: &str = "Bridge";
pub const TABLE_PORT: &str = "Port";
pub const TABLE_INTERFACE: &str = "Interface";

fn ownership_metadata() -> Metadata {
    Metadata::new().with(attr::RELATION_TYPE, RelationType::Ownership)
}

fn layer2_metadata() -> Metadata {
    Metadata::new().with(attr::RELATION_TYPE, RelationType::Layer2)
}

fn row_name(row: &Json) -> Option<&str> {
    row.get("name").and_then(Json::as_str)
}

/// Interface.type → our `Type` attribute. OVS leaves `system` interfaces'
/// type blank in older schema versions; both map to the generic device
/// type so they correlate with whatever the netlink probe already created.
fn interface_node_type(row: &Json) -> String {
    match row.get("type").and_then(Json::as_str).unwrap_or("") {
        "" | "system" => node_type::DEVICE.to_string(),
        "internal" => node_type::INTERNAL.to_string(),
        "patch" => node_type::PATCH.to_string(),
        other => other.to_string(),
    }
}

/// Upsert the node for one OVSDB row. Identity is by `UUID` once known;
/// before that, by (`Name`, `Driver=openvswitch`) so a node the netlink
/// probe already created for the same device is reused rather than
/// duplicated (mirrors `topo_netlink::reconcile`'s openvswitch branch).
fn upsert_row_node(writer: &mut GraphWriter<'_>, uuid: &str, name: &str, node_type_value: &str) -> (Node, bool) {
    let by_uuid = MetadataFilter::new().with(attr::UUID, uuid);
    if let Some(existing) = writer.lookup_first_node(&by_uuid) {
        return (existing, true);
    }
    let by_name = MetadataFilter::new().with(attr::NAME, name).with(attr::DRIVER, attr::DRIVER_OPENVSWITCH);
    if let Some(existing) = writer.lookup_first_node(&by_name) {
        return (existing, true);
    }
    let metadata = Metadata::new()
        .with(attr::NAME, name)
        .with(attr::TYPE, node_type_value)
        .with(attr::DRIVER, attr::DRIVER_OPENVSWITCH)
        .with(attr::UUID, uuid);
    let node = writer.new_node(metadata);
    (writer.add_node(node), false)
}

fn apply_metadata_delta(writer: &mut GraphWriter<'_>, node: &Node, incoming: &Metadata) {
    let delta = node.metadata.delta(incoming);
    if !delta.is_empty() {
        writer.merge_node_metadata(&node.id, &delta);
    }
}

fn link_patch_peers(writer: &mut GraphWriter<'_>, name: &str, node_id: &Identifier, peer_name: &str) {
    let filter = MetadataFilter::new()
        .with(attr::TYPE, node_type::PATCH)
        .with(attr::NAME, peer_name)
        .with(attr::DRIVER, attr::DRIVER_OPENVSWITCH);
    let Some(peer) = writer.lookup_first_node(&filter) else {
        // The peer interface row hasn't arrived yet; whichever side
        // reconciles second will find this one already present and
        // complete the link (order-independent, like the netlink probe's
        // veth resolution, but without a retry loop since both directions
        // converge on the same edge below).
        return;
    };
    // Always link lexicographically-smaller name -> larger, so whichever
    // side runs this first and whichever runs second produce the exact
    // same (parent, child) pair and `Link`'s idempotence collapses them.
    let (parent, child) = if name < peer_name { (node_id, &peer.id) } else { (&peer.id, node_id) };
    writer.link(parent, child, layer2_metadata().with(attr::TYPE, node_type::PATCH));
}

/// Find the `Bridge` row (if any, already cached) whose `ports` set
/// contains `port_uuid`, returning its UUID and name. Lets `reconcile_port`
/// complete the bridge->port ownership edge when the bridge row reconciled
/// first but didn't yet see this port in its `ports` column, or hasn't
/// reconciled at all yet this batch (§4.E "Upsert the node for one OVSDB
/// row").
fn find_owning_bridge<'a>(cache: &'a RowCache, port_uuid: &str) -> Option<(&'a str, &'a str)> {
    cache.rows(TABLE_BRIDGE).find_map(|(bridge_uuid, bridge_row)| {
        let ports = bridge_row.get("ports")?;
        let owns = ports.as_ovs_set().into_iter().filter_map(Json::as_uuid).any(|p| p == port_uuid);
        if !owns {
            return None;
        }
        row_name(bridge_row).map(|name| (bridge_uuid.as_str(), name))
    })
}

fn reconcile_bridge(writer: &mut GraphWriter<'_>, root: &Identifier, uuid: &str, row: &Json) {
    let Some(name) = row_name(row) else { return };
    let (node, preexisted) = upsert_row_node(writer, uuid, name, node_type::OVS_BRIDGE);
    writer.link(root, &node.id, ownership_metadata());

    let incoming = Metadata::new().with(attr::NAME, name).with(attr::DRIVER, attr::DRIVER_OPENVSWITCH).with(attr::UUID, uuid);
    if preexisted {
        apply_metadata_delta(writer, &node, &incoming);
    }

    if let Some(ports) = row.get("ports") {
        for port_uuid in ports.as_ovs_set().into_iter().filter_map(Json::as_uuid) {
            let filter = MetadataFilter::new().with(attr::UUID, port_uuid);
            if let Some(port_node) = writer.lookup_first_node(&filter) {
                writer.link(&node.id, &port_node.id, ownership_metadata());
            }
            // If the port node doesn't exist yet, `reconcile_port` links it
            // up to this bridge (via `find_owning_bridge`) once its own row
            // arrives — order-independent like the patch-peer edge below.
        }
    }
}

fn reconcile_port(writer: &mut GraphWriter<'_>, cache: &RowCache, uuid: &str, row: &Json) {
    let Some(name) = row_name(row) else { return };
    let (node, preexisted) = upsert_row_node(writer, uuid, name, node_type::OVS_PORT);

    let incoming = Metadata::new().with(attr::NAME, name).with(attr::DRIVER, attr::DRIVER_OPENVSWITCH).with(attr::UUID, uuid);
    if preexisted {
        apply_metadata_delta(writer, &node, &incoming);
    }

    if let Some((bridge_uuid, bridge_name)) = find_owning_bridge(cache, uuid) {
        let (bridge_node, _) = upsert_row_node(writer, bridge_uuid, bridge_name, node_type::OVS_BRIDGE);
        writer.link(&bridge_node.id, &node.id, ownership_metadata());
    }

    if let Some(interfaces) = row.get("interfaces") {
        for iface_uuid in interfaces.as_ovs_set().into_iter().filter_map(Json::as_uuid) {
            let filter = MetadataFilter::new().with(attr::UUID, iface_uuid);
            if let Some(iface_node) = writer.lookup_first_node(&filter) {
                writer.link(&node.id, &iface_node.id, ownership_metadata());
            }
        }
    }
}

fn reconcile_interface(writer: &mut GraphWriter<'_>, uuid: &str, row: &Json) {
    let Some(name) = row_name(row) else { return };
    let node_type_value = interface_node_type(row);
    let (node, preexisted) = upsert_row_node(writer, uuid, name, &node_type_value);

    let incoming = Metadata::new()
        .with(attr::NAME, name)
        .with(attr::TYPE, node_type_value.clone())
        .with(attr::DRIVER, attr::DRIVER_OPENVSWITCH)
        .with(attr::UUID, uuid);
    if preexisted {
        apply_metadata_delta(writer, &node, &incoming);
    }

    if node_type_value == node_type::PATCH
        && let Some(peer_name) = row
            .get("options")
            .and_then(Json::as_object)
            .and_then(|m| m.get("peer"))
            .and_then(Json::as_str)
    {
        link_patch_peers(writer, name, &node.id, peer_name);
    }
}

/// Translate one batch of OVSDB row changes (already merged against the
/// local cache, §4.E) into graph mutations. `cache` is the same merged row
/// cache the batch was produced from, so a row can look up the full
/// current state of rows that reconciled earlier this batch (or in a prior
/// batch) without waiting for their own next update. Called with the graph
/// write lock held for the whole batch, the same discipline the netlink
/// probe uses for one kernel event (§5 "shared-resource policy").
pub fn apply_row_changes(writer: &mut GraphWriter<'_>, root: &Identifier, cache: &RowCache, changes: &[RowChange]) {
    for change in changes {
        match change {
            RowChange::Upserted { table, uuid, row } => match table.as_str() {
                TABLE_BRIDGE => reconcile_bridge(writer, root, uuid, row),
                TABLE_PORT => reconcile_port(writer, cache, uuid, row),
                TABLE_INTERFACE => reconcile_interface(writer, uuid, row),
                _ => {}
            },
            RowChange::Deleted { uuid, .. } => {
                let filter = MetadataFilter::new().with(attr::UUID, uuid.as_str());
                if let Some(node) = writer.lookup_first_node(&filter) {
                    writer.del_node_cascade(&node.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_graph::{Graph, InMemoryBackend};

    fn new_graph() -> Graph {
        Graph::new(Box::new(InMemoryBackend::new()), "test-host")
    }

    fn bridge_row(name: &str, ports: Vec<&str>) -> Json {
        Json::object([
            ("name".to_string(), Json::string(name)),
            (
                "ports".to_string(),
                Json::Array(vec![
                    Json::string("set"),
                    Json::Array(
                        ports
                            .into_iter()
                            .map(|p| Json::Array(vec![Json::string("uuid"), Json::string(p)]))
                            .collect(),
                    ),
                ]),
            ),
        ])
    }

    fn port_row(name: &str, interfaces: Vec<&str>) -> Json {
        Json::object([
            ("name".to_string(), Json::string(name)),
            (
                "interfaces".to_string(),
                Json::Array(vec![
                    Json::string("set"),
                    Json::Array(
                        interfaces
                            .into_iter()
                            .map(|i| Json::Array(vec![Json::string("uuid"), Json::string(i)]))
                            .collect(),
                    ),
                ]),
            ),
        ])
    }

    fn interface_row(name: &str, iface_type: &str) -> Json {
        Json::object([
            ("name".to_string(), Json::string(name)),
            ("type".to_string(), Json::string(iface_type)),
        ])
    }

    /// Builds a `monitor`-reply-shaped payload (`{table: {uuid: {new: row}}}`)
    /// the way `OvsdbTransport` actually delivers one: as a `Json::Object`,
    /// whose `BTreeMap` backing sorts table names alphabetically
    /// (`Bridge`, `Interface`, `Port`) regardless of the order passed here —
    /// the same ordering `RowCache::apply` iterates in production.
    fn monitor_payload(entries: Vec<(&str, &str, Json)>) -> Json {
        let mut tables: std::collections::BTreeMap<String, Json> = Default::default();
        for (table, uuid, row) in entries {
            let Json::Object(rows) = tables.entry(table.to_string()).or_insert_with(|| Json::object([])) else {
                unreachable!()
            };
            rows.insert(uuid.to_string(), Json::object([("new".to_string(), row)]));
        }
        Json::Object(tables)
    }

    #[test]
    fn bridge_port_interface_chain_creates_ownership_edges() {
        let graph = new_graph();
        let mut writer = graph.write();
        let root = graph.root().clone();
        let mut cache = RowCache::new();

        // All three rows arrive in one batch, the way a single `add-br`
        // transaction (or the initial `monitor` reply) does. `RowCache`
        // iterates its `BTreeMap` in key order, i.e. Bridge before Port,
        // so the bridge reconciles before its port node exists.
        let payload = monitor_payload(vec![
            ("Bridge", "b1", bridge_row("br-test1", vec!["p1"])),
            ("Interface", "if1", interface_row("br-test1", "internal")),
            ("Port", "p1", port_row("br-test1", vec!["if1"])),
        ]);
        let changes = cache.apply(&payload);
        apply_row_changes(&mut writer, &root, &cache, &changes);

        let bridge = writer.lookup_first_node(&MetadataFilter::new().with(attr::TYPE, node_type::OVS_BRIDGE)).unwrap();
        let port = writer.lookup_first_child(&bridge.id, &MetadataFilter::new().with(attr::TYPE, node_type::OVS_PORT)).unwrap();
        let iface = writer.lookup_first_child(&port.id, &MetadataFilter::new().with(attr::TYPE, node_type::INTERNAL)).unwrap();
        assert_eq!(iface.metadata.get_str(attr::DRIVER), Some(attr::DRIVER_OPENVSWITCH));
    }

    #[test]
    fn patch_ports_link_to_each_other_by_name() {
        let graph = new_graph();
        let mut writer = graph.write();
        let root = graph.root().clone();

        apply_row_changes(
            &mut writer,
            &root,
            &RowCache::new(),
            &[
                RowChange::Upserted {
                    table: "Interface".into(),
                    uuid: "a".into(),
                    row: Json::object([
                        ("name".to_string(), Json::string("patch-a")),
                        ("type".to_string(), Json::string("patch")),
                        ("options".to_string(), Json::object([("peer".to_string(), Json::string("patch-b"))])),
                    ]),
                },
                RowChange::Upserted {
                    table: "Interface".into(),
                    uuid: "b".into(),
                    row: Json::object([
                        ("name".to_string(), Json::string("patch-b")),
                        ("type".to_string(), Json::string("patch")),
                        ("options".to_string(), Json::object([("peer".to_string(), Json::string("patch-a"))])),
                    ]),
                },
            ],
        );

        let a = writer.lookup_first_node(&MetadataFilter::new().with(attr::NAME, "patch-a")).unwrap();
        let b = writer.lookup_first_node(&MetadataFilter::new().with(attr::NAME, "patch-b")).unwrap();
        assert!(writer.are_linked(&a.id, &b.id) || writer.are_linked(&b.id, &a.id));
    }

    #[test]
    fn deleting_a_bridge_row_cascades_to_its_ports_and_interfaces() {
        let graph = new_graph();
        let mut writer = graph.write();
        let root = graph.root().clone();

        apply_row_changes(
            &mut writer,
            &root,
            &RowCache::new(),
            &[
                RowChange::Upserted { table: "Interface".into(), uuid: "if1".into(), row: interface_row("br-test1", "internal") },
                RowChange::Upserted { table: "Port".into(), uuid: "p1".into(), row: port_row("br-test1", vec!["if1"]) },
                RowChange::Upserted { table: "Bridge".into(), uuid: "b1".into(), row: bridge_row("br-test1", vec!["p1"]) },
            ],
        );
        let port = writer.lookup_first_node(&MetadataFilter::new().with(attr::TYPE, node_type::OVS_PORT)).unwrap();

        apply_row_changes(&mut writer, &root, &RowCache::new(), &[RowChange::Deleted { table: "Bridge".into(), uuid: "b1".into() }]);

        assert!(writer.get_node(&port.id).is_none());
    }
}
