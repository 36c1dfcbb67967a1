//! Names of the reserved metadata attributes (§3 "Entities").
//!
//! These are plain string constants, not an enum: the metadata map is open
//! by design, and a probe is free to introduce its own namespaced keys
//! (`Docker.ContainerName`) alongside these.

pub const NAME: &str = "Name";
pub const TYPE: &str = "Type";
pub const IF_INDEX: &str = "IfIndex";
pub const MAC: &str = "MAC";
pub const MTU: &str = "MTU";
pub const IPV4: &str = "IPV4";
pub const STATE: &str = "State";
pub const DRIVER: &str = "Driver";
pub const UUID: &str = "UUID";
pub const VLAN: &str = "Vlan";
pub const BOND_MODE: &str = "BondMode";
pub const MANAGER: &str = "Manager";
pub const HOST: &str = "Host";
pub const MASTER_INDEX: &str = "MasterIndex";

/// Reserved key on an edge's metadata: `"ownership"` or `"layer2"`.
pub const RELATION_TYPE: &str = "RelationType";

/// Docker-namespaced key for the container's display name.
pub const DOCKER_CONTAINER_NAME: &str = "Docker.ContainerName";

/// Docker-namespaced key carrying the container's daemon-assigned ID, used
/// to re-find a container node across events without keeping a private
/// index in the probe (mirrors how the OVSDB probe re-finds rows by
/// `UUID`).
pub const DOCKER_CONTAINER_ID: &str = "Docker.ContainerID";

pub const STATE_UP: &str = "UP";
pub const STATE_DOWN: &str = "DOWN";

pub const MANAGER_DOCKER: &str = "docker";
pub const DRIVER_OPENVSWITCH: &str = "openvswitch";
pub const DRIVER_BRIDGE: &str = "bridge";
