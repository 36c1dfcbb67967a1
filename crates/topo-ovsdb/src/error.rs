use std::fmt;

/// Errors from the OVSDB JSON-RPC transport (§4.E, §7 "Transient I/O" /
/// "Terminal").
#[derive(Debug)]
pub enum OvsdbError {
    Io(std::io::Error),
    Malformed(String),
    Rpc(String),
}

impl fmt::Display for OvsdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OvsdbError::Io(e) => write!(f, "ovsdb connection error: {e}"),
            OvsdbError::Malformed(msg) => write!(f, "malformed ovsdb message: {msg}"),
            OvsdbError::Rpc(msg) => write!(f, "ovsdb rpc error: {msg}"),
        }
    }
}

impl std::error::Error for OvsdbError {}

impl From<std::io::Error> for OvsdbError {
    fn from(e: std::io::Error) -> Self {
        OvsdbError::Io(e)
    }
}
