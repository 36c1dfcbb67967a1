//! The Docker probe (§4.F): maps container lifecycle events from the
//! daemon's UNIX socket onto `container` nodes, correlating each with the
//! `netns` node the namespace probe (`topo-netns`) produces for its network
//! namespace.
//!
//! `rpc` is the wire surface (HTTP-over-UNIX-socket, reusing
//! `topo_ovsdb::Json` rather than pulling in a second JSON stack for
//! payloads this small); `model` normalizes a daemon inspect response into
//! the shape `probe.rs` reconciles against the graph.

mod error;
mod model;
mod probe;
mod rpc;

pub use error::DockerError;
pub use model::{ContainerInfo, NetworkMode};
pub use probe::{DEFAULT_SOCKET, DockerProbe};
pub use rpc::{DockerEventStream, DockerTransport};
