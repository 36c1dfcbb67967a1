//! The netlink probe (§4.C): translates `RTNETLINK/RTNLGRP_LINK`
//! notifications into graph mutations, one instance per network namespace.
//!
//! The translation logic (`reconcile`) is kept independent of the kernel
//! I/O surface (`LinkSource`) so it can be unit-tested against a fake; only
//! `probe.rs` ever awaits a real socket or ioctl.

mod ethtool;
mod kernel;
mod link_source;
mod probe;
mod queue;
mod reconcile;

pub use kernel::RtNetlinkSource;
pub use link_source::{KernelLink, LinkEvent, LinkSource};
pub use probe::NetlinkProbe;
pub use queue::DeferredQueue;
pub use reconcile::{AddOutcome, metadata_for, on_link_added, on_link_deleted};
