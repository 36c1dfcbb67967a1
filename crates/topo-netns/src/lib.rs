//! The namespace probe (§4.D): watches the conventional network-namespace
//! mount directory and re-roots a netlink probe instance under each
//! discovered `netns` node.

mod enter;
mod probe;
mod watch;

pub use probe::NetnsProbe;

/// Conventional network-namespace mount directory (`ip netns` convention).
pub const DEFAULT_NETNS_DIR: &str = "/var/run/netns";
