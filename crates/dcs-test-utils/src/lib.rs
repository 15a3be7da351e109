//! Mock IPC client for driving a running control server over a UNIX domain
//! socket in integration tests, without needing a real plugin or G-code
//! interpreter on the other end.

use std::path::Path;

use dcs_protocol::{ClientHello, InitResponse, ServerHello};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// A client connected to a control-server socket, speaking the
/// concatenated-JSON framing directly rather than going through any of the
/// daemon's own connection-handling code.
pub struct MockClient {
    stream: UnixStream,
    buf: Vec<u8>,
}

impl MockClient {
    /// Open a raw connection. Does not perform the hello handshake; call
    /// [`MockClient::handshake`] next, or drive the hello frames manually to
    /// exercise malformed-handshake scenarios.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream, buf: Vec::new() })
    }

    /// Serialize `value` and write it as a frame.
    pub async fn send<T: Serialize>(&mut self, value: &T) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = dcs_protocol::encode_frame(value)?;
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    /// Read bytes off the socket until a complete frame has accumulated,
    /// then decode it as `T`. Bytes belonging to the next frame are kept
    /// buffered for the following call.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<T, Box<dyn std::error::Error>> {
        loop {
            match dcs_protocol::try_parse_frame(&self.buf)? {
                dcs_protocol::FrameAttempt::Complete { value, consumed } => {
                    let typed: T = serde_json::from_value(value)?;
                    self.buf.drain(..consumed);
                    return Ok(typed);
                }
                dcs_protocol::FrameAttempt::Incomplete => {
                    let mut chunk = [0u8; 4096];
                    let n = self.stream.read(&mut chunk).await?;
                    if n == 0 {
                        return Err("connection closed before a full frame arrived".into());
                    }
                    self.buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    /// Read one frame as a raw [`Value`], for tests that assert on exact
    /// wire shape rather than a typed view of it.
    pub async fn recv_value(&mut self) -> Result<Value, Box<dyn std::error::Error>> {
        self.recv().await
    }

    /// Perform the full handshake: read the unsolicited server-hello, send
    /// `hello` as the client-hello, and return the server's init-response.
    /// Per protocol, a `success: false` init-response is always followed by
    /// the server closing the connection, so callers should not expect to
    /// read further frames after a failed handshake.
    pub async fn handshake(
        &mut self,
        hello: ClientHello,
    ) -> Result<InitResponse, Box<dyn std::error::Error>> {
        let _server_hello: ServerHello = self.recv().await?;
        self.send(&hello).await?;
        self.recv().await
    }

    /// Shut down the write half, signalling end-of-stream to the server.
    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
