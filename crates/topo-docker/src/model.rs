use topo_ovsdb::Json;

/// How a container's network namespace relates to the host's (§4.F).
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkMode {
    /// The container owns a namespace of its own, bind-mounted at the given
    /// path (Docker's `NetworkSettings.SandboxKey`).
    Own { sandbox_key: String },
    /// `--net=host`: no dedicated namespace, no `netns` node.
    Host,
    /// `--net=container:<id>`: shares another container's namespace.
    Shared { container_id: String },
}

/// One container, normalized from a `GET /containers/<id>/json` response
/// into the shape `probe.rs` reconciles against the graph — kept
/// independent of the raw wire `Json` the same way `topo_netlink::KernelLink`
/// is independent of the raw netlink message.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub network_mode: NetworkMode,
}

impl ContainerInfo {
    pub fn from_inspect(id: &str, row: &Json) -> Option<Self> {
        let name = row.get("Name").and_then(Json::as_str).map(strip_leading_slash)?;
        let network_mode_str = row.get("HostConfig").and_then(|h| h.get("NetworkMode")).and_then(Json::as_str).unwrap_or("default");

        let network_mode = if network_mode_str == "host" {
            NetworkMode::Host
        } else if let Some(other_id) = network_mode_str.strip_prefix("container:") {
            NetworkMode::Shared { container_id: other_id.to_string() }
        } else {
            let sandbox_key = row.get("NetworkSettings").and_then(|n| n.get("SandboxKey")).and_then(Json::as_str)?.to_string();
            NetworkMode::Own { sandbox_key }
        };

        Some(ContainerInfo { id: id.to_string(), name, network_mode })
    }
}

fn strip_leading_slash(name: &str) -> String {
    name.strip_prefix('/').unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspect(network_mode: &str, sandbox_key: Option<&str>) -> Json {
        let mut host_config = std::collections::BTreeMap::new();
        host_config.insert("NetworkMode".to_string(), Json::string(network_mode));

        let mut network_settings = std::collections::BTreeMap::new();
        if let Some(key) = sandbox_key {
            network_settings.insert("SandboxKey".to_string(), Json::string(key));
        }

        Json::object([
            ("Name".to_string(), Json::string("/web-1")),
            ("HostConfig".to_string(), Json::Object(host_config)),
            ("NetworkSettings".to_string(), Json::Object(network_settings)),
        ])
    }

    #[test]
    fn own_namespace_mode_carries_the_sandbox_key() {
        let row = inspect("default", Some("/var/run/docker/netns/abc123"));
        let info = ContainerInfo::from_inspect("c1", &row).unwrap();
        assert_eq!(info.name, "web-1");
        assert_eq!(info.network_mode, NetworkMode::Own { sandbox_key: "/var/run/docker/netns/abc123".to_string() });
    }

    #[test]
    fn host_mode_has_no_sandbox_key() {
        let row = inspect("host", None);
        let info = ContainerInfo::from_inspect("c1", &row).unwrap();
        assert_eq!(info.network_mode, NetworkMode::Host);
    }

    #[test]
    fn shared_mode_extracts_the_owning_container_id() {
        let row = inspect("container:c0", None);
        let info = ContainerInfo::from_inspect("c1", &row).unwrap();
        assert_eq!(info.network_mode, NetworkMode::Shared { container_id: "c0".to_string() });
    }
}
