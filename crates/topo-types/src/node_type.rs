//! Values of the reserved `Type` attribute (§3 "Entities").

pub const HOST: &str = "host";
pub const BRIDGE: &str = "bridge";
pub const OVS_BRIDGE: &str = "ovsbridge";
pub const OVS_PORT: &str = "ovsport";
pub const VETH: &str = "veth";
pub const INTERNAL: &str = "internal";
pub const PATCH: &str = "patch";
pub const NETNS: &str = "netns";
pub const CONTAINER: &str = "container";
pub const VLAN: &str = "vlan";
pub const BOND: &str = "bond";

/// Fallback `Type` for a kernel link whose `IFLA_INFO_KIND` is absent —
/// physical NICs and other plain device links.
pub const DEVICE: &str = "device";
