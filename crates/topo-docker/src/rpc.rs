use std::path::{Path, PathBuf};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Request, body::Incoming};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use hyperlocal::{UnixClientExt, UnixConnector};
use topo_ovsdb::{Json, ParseError, parse_one};

use crate::error::DockerError;

/// A bare HTTP-over-UNIX-socket client for the Docker daemon (§4.F "Wire
/// surface"), mirroring `topo_ovsdb::OvsdbTransport`'s split between a
/// dumb transport and the reconciliation logic that reads it.
pub struct DockerTransport {
    client: Client<UnixConnector, Empty<Bytes>>,
    socket_path: PathBuf,
}

impl DockerTransport {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build(UnixConnector),
            socket_path: socket_path.into(),
        }
    }

    fn uri(&self, path: &str) -> hyper::Uri {
        hyperlocal::Uri::new(&self.socket_path, path).into()
    }

    /// `GET` a path expecting a single complete JSON body (`/containers/json`,
    /// `/containers/<id>/json`).
    pub async fn get_json(&self, path: &str) -> Result<Json, DockerError> {
        let request = Request::builder().method("GET").uri(self.uri(path)).body(Empty::new())?;
        let response = self.client.request(request).await?;
        let body = response.into_body().collect().await?.to_bytes();
        let (value, _) = parse_one(&body).map_err(|e| match e {
            ParseError::Incomplete => DockerError::Malformed("truncated docker response".to_string()),
            ParseError::Malformed(msg) => DockerError::Malformed(msg),
        })?;
        Ok(value)
    }

    /// `GET /events`: an open-ended stream of newline-delimited JSON
    /// objects, one per container/network lifecycle event.
    pub async fn events(&self) -> Result<DockerEventStream, DockerError> {
        let request = Request::builder().method("GET").uri(self.uri("/events")).body(Empty::new())?;
        let response = self.client.request(request).await?;
        Ok(DockerEventStream {
            body: response.into_body(),
            buf: Vec::new(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Incremental reader over `/events`'s body: each `next` call blocks until
/// one complete JSON object has arrived, buffering partial frames the same
/// way `OvsdbTransport::recv` buffers partial RPC messages.
pub struct DockerEventStream {
    body: Incoming,
    buf: Vec<u8>,
}

impl DockerEventStream {
    pub async fn next(&mut self) -> Result<Option<Json>, DockerError> {
        loop {
            match parse_one(&self.buf) {
                Ok((value, consumed)) => {
                    self.buf.drain(..consumed);
                    return Ok(Some(value));
                }
                Err(ParseError::Incomplete) => match self.body.frame().await {
                    Some(Ok(frame)) => {
                        if let Some(data) = frame.data_ref() {
                            self.buf.extend_from_slice(data);
                        }
                    }
                    Some(Err(e)) => return Err(DockerError::Http(e.to_string())),
                    None => return Ok(None),
                },
                Err(ParseError::Malformed(msg)) => return Err(DockerError::Malformed(msg)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_joins_socket_path_and_endpoint() {
        let transport = DockerTransport::new("/var/run/docker.sock");
        assert_eq!(transport.socket_path(), Path::new("/var/run/docker.sock"));
    }
}
