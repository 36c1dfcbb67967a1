//! The OVSDB probe (§4.E): a minimal JSON-RPC 2.0 client for the Open
//! vSwitch management socket, reconciling `Bridge`/`Port`/`Interface` rows
//! into the graph.
//!
//! `json` and `rpc` are the wire surface; `rows` turns the protocol's
//! partial-column `update` notifications into full merged rows; `reconcile`
//! is the pure translation from rows to graph mutations, kept independent
//! of the socket so it can be unit-tested against literal `Json` values.

mod error;
mod json;
mod probe;
mod reconcile;
mod rows;
mod rpc;

pub use error::OvsdbError;
pub use json::{Json, ParseError, parse_one, to_string};
pub use probe::OvsdbProbe;
pub use reconcile::{TABLE_BRIDGE, TABLE_INTERFACE, TABLE_PORT, apply_row_changes};
pub use rows::{RowCache, RowChange};
pub use rpc::OvsdbTransport;
