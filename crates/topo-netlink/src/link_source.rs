use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Everything `onLinkAdded`/`onLinkDeleted` (§4.C) needs about one kernel
/// link, already normalized: the translation logic never touches a raw
/// netlink attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelLink {
    pub index: u32,
    pub name: String,
    /// Kernel link kind (`veth`, `bridge`, `vlan`, `bond`, ... or empty for
    /// a plain physical/generic link).
    pub kind: String,
    pub mac: Option<String>,
    pub mtu: Option<u32>,
    /// Comma-joined CIDR strings, already formatted per §4.C.
    pub ipv4: String,
    pub up: bool,
    pub master_index: Option<u32>,
    pub vlan_id: Option<i64>,
    pub bond_mode: Option<String>,
    /// Ethtool driver name, empty string if the ioctl returned nothing.
    pub driver: String,
}

/// A `RTM_NEWLINK`/`RTM_DELLINK` notification, already reduced to the one
/// thing `onLinkAdded`/`onLinkDeleted` dispatch on (§4.C "Event loop").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    New(u32),
    Del(u32),
}

/// The kernel I/O surface the netlink probe's translation logic runs
/// against (SPEC_FULL.md §4.C "Kernel I/O surface"). Kept as a trait so
/// `reconcile` is unit-testable against a fake, without a real kernel or
/// root.
///
/// Methods return boxed futures by hand (matching `topo_probe::Probe`'s
/// convention) rather than pulling in an `async-trait` dependency the rest
/// of the workspace doesn't use.
pub trait LinkSource: Send + Sync {
    /// Enumerate every link currently present, in kernel order. Used once
    /// at startup to seed the graph as if each were a fresh `NEWLINK`.
    fn list_links(&self) -> Pin<Box<dyn Future<Output = Vec<KernelLink>> + Send + '_>>;

    /// Resolve a single link by kernel index. `None` if it no longer exists
    /// (the caller raced a deletion).
    fn get_link(&self, index: u32) -> Pin<Box<dyn Future<Output = Option<KernelLink>> + Send + '_>>;

    /// The veth peer's ifindex, via the ethtool stats ioctl (§4.C "Veth peer").
    fn peer_ifindex(&self, index: u32) -> Pin<Box<dyn Future<Output = Option<u32>> + Send + '_>>;

    /// Block for up to `timeout` waiting for the next link event. `None` on
    /// timeout, matching the 1-second epoll wait in §4.C.
    fn next_event(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Option<LinkEvent>> + Send + '_>>;
}
