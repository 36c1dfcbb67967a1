use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::OvsdbError;
use crate::json::{self, Json, ParseError};

const READ_CHUNK: usize = 4096;

/// A bare JSON-RPC 2.0 transport over a TCP stream to the OVSDB management
/// socket (§4.E "Wire surface"). One complete JSON value in, one complete
/// JSON value out; request/notification framing on top is the caller's job
/// (`probe.rs`), since OVSDB multiplexes `monitor` replies and `update`
/// notifications over the same connection.
pub struct OvsdbTransport {
    stream: TcpStream,
    buf: Vec<u8>,
    next_id: i64,
}

impl OvsdbTransport {
    pub async fn connect(host: &str, port: u16) -> Result<Self, OvsdbError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            stream,
            buf: Vec::new(),
            next_id: 1,
        })
    }

    pub fn fresh_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub async fn send(&mut self, value: &Json) -> Result<(), OvsdbError> {
        let text = json::to_string(value);
        self.stream.write_all(text.as_bytes()).await?;
        Ok(())
    }

    /// Block until one complete top-level JSON value has arrived, parse it,
    /// and retain any trailing bytes (the start of the next message) in the
    /// buffer for the following call.
    pub async fn recv(&mut self) -> Result<Json, OvsdbError> {
        loop {
            match json::parse_one(&self.buf) {
                Ok((value, consumed)) => {
                    self.buf.drain(..consumed);
                    return Ok(value);
                }
                Err(ParseError::Incomplete) => {
                    let mut chunk = [0u8; READ_CHUNK];
                    let n = self.stream.read(&mut chunk).await?;
                    if n == 0 {
                        return Err(OvsdbError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "ovsdb connection closed",
                        )));
                    }
                    self.buf.extend_from_slice(&chunk[..n]);
                }
                Err(ParseError::Malformed(msg)) => return Err(OvsdbError::Malformed(msg)),
            }
        }
    }

    /// Send a JSON-RPC request and wait for the response carrying the same
    /// `id`; any other message received meanwhile (an interleaved `update`
    /// notification) is handed to `on_notification` rather than dropped.
    pub async fn call(
        &mut self,
        method: &str,
        params: Json,
        mut on_notification: impl FnMut(Json),
    ) -> Result<Json, OvsdbError> {
        let id = self.fresh_id();
        let request = Json::object([
            ("id".to_string(), Json::Number(id as f64)),
            ("method".to_string(), Json::string(method)),
            ("params".to_string(), params),
        ]);
        self.send(&request).await?;

        loop {
            let message = self.recv().await?;
            let is_response = message.get("id").and_then(Json::as_f64) == Some(id as f64);
            if !is_response {
                on_notification(message);
                continue;
            }
            if let Some(error) = message.get("error")
                && !matches!(error, Json::Null)
            {
                return Err(OvsdbError::Rpc(json::to_string(error)));
            }
            return Ok(message.get("result").cloned().unwrap_or(Json::Null));
        }
    }
}
