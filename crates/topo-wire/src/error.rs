use std::fmt;

/// Errors from encoding/decoding the websocket wire protocol.
#[derive(Debug)]
pub enum WireError {
    Encode(String),
    Decode(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Encode(msg) => write!(f, "failed to encode wire message: {msg}"),
            WireError::Decode(msg) => write!(f, "failed to decode wire message: {msg}"),
        }
    }
}

impl std::error::Error for WireError {}
