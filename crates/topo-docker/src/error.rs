use std::fmt;

/// Errors from the Docker daemon's UNIX-socket HTTP API (§4.F, §7
/// "Transient I/O" / "Terminal").
#[derive(Debug)]
pub enum DockerError {
    Io(std::io::Error),
    Http(String),
    Malformed(String),
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerError::Io(e) => write!(f, "docker socket error: {e}"),
            DockerError::Http(msg) => write!(f, "docker http error: {msg}"),
            DockerError::Malformed(msg) => write!(f, "malformed docker response: {msg}"),
        }
    }
}

impl std::error::Error for DockerError {}

impl From<std::io::Error> for DockerError {
    fn from(e: std::io::Error) -> Self {
        DockerError::Io(e)
    }
}

impl From<hyper::Error> for DockerError {
    fn from(e: hyper::Error) -> Self {
        DockerError::Http(e.to_string())
    }
}

impl From<hyper::http::Error> for DockerError {
    fn from(e: hyper::http::Error) -> Self {
        DockerError::Http(e.to_string())
    }
}

impl From<hyper_util::client::legacy::Error> for DockerError {
    fn from(e: hyper_util::client::legacy::Error) -> Self {
        DockerError::Http(e.to_string())
    }
}
