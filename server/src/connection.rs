use std::collections::HashSet;
use std::sync::Arc;

use dcs_protocol::{FrameAttempt, Mode, Permission};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::PeerIdentity;
use crate::error::DispatchError;

/// One accepted socket. Owns the read half directly (a single reader task
/// exists per connection, so no mutex is needed there) and the write half
/// behind a mutex (shared with any task that pushes unsolicited frames —
/// intercept offers, subscribe pushes — concurrently with response writes).
pub struct Connection {
    pub id: u32,
    pub peer_pid: i32,
    pub permissions: HashSet<Permission>,
    pub mode: Mode,
    pub cancellation: CancellationToken,
    read_half: OwnedReadHalf,
    read_buf: Vec<u8>,
    write_half: Arc<Mutex<OwnedWriteHalf>>,
}

impl Connection {
    pub fn new(
        id: u32,
        identity: PeerIdentity,
        permissions: HashSet<Permission>,
        mode: Mode,
        read_half: OwnedReadHalf,
        write_half: OwnedWriteHalf,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer_pid: identity.pid,
            permissions,
            mode,
            cancellation,
            read_half,
            read_buf: Vec::new(),
            write_half: Arc::new(Mutex::new(write_half)),
        }
    }

    /// Hand the connection whatever bytes were already read off the socket
    /// during the handshake but belonged to the next frame, not the
    /// client-hello.
    pub fn seed_read_buffer(&mut self, buf: Vec<u8>) {
        self.read_buf = buf;
    }

    /// A cloneable sender usable from a task other than the one that owns
    /// `recv_frame`, e.g. the fanout push task for this subscriber.
    pub fn writer(&self) -> FrameWriter {
        FrameWriter { write_half: self.write_half.clone() }
    }

    pub async fn send_frame<T: Serialize + Sync>(&self, value: &T) -> Result<(), DispatchError> {
        self.writer().send_frame(value).await
    }

    /// Read the next frame off the socket, decoded as `T`. Returns `Ok(None)`
    /// on a clean EOF between frames (the normal way a connection closes).
    pub async fn recv_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DispatchError> {
        let value = self.recv_value().await?;
        match value {
            Some(value) => {
                let typed = serde_json::from_value(value)
                    .map_err(|e| DispatchError::Deserialization(e.to_string()))?;
                Ok(Some(typed))
            }
            None => Ok(None),
        }
    }

    /// Read the next frame as a [`dcs_protocol::Command`], distinguishing an
    /// unrecognized `command` tag value (`UnknownCommand`) from a frame that
    /// is malformed for some other reason (`Deserialization`).
    pub async fn recv_command(&mut self) -> Result<Option<dcs_protocol::Command>, DispatchError> {
        match self.recv_value().await? {
            Some(value) => decode_command(value).map(Some),
            None => Ok(None),
        }
    }

    async fn recv_value(&mut self) -> Result<Option<Value>, DispatchError> {
        loop {
            match dcs_protocol::try_parse_frame(&self.read_buf) {
                Ok(FrameAttempt::Complete { value, consumed }) => {
                    self.read_buf.drain(..consumed);
                    return Ok(Some(value));
                }
                Ok(FrameAttempt::Incomplete) => {
                    let mut chunk = [0u8; 8192];
                    let n = tokio::select! {
                        biased;
                        () = self.cancellation.cancelled() => return Err(DispatchError::Cancelled),
                        result = self.read_half.read(&mut chunk) => result?,
                    };
                    if n == 0 {
                        if self.read_buf.is_empty() {
                            return Ok(None);
                        }
                        return Err(DispatchError::Protocol(
                            "connection closed mid-frame".to_owned(),
                        ));
                    }
                    self.read_buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) => return Err(DispatchError::Deserialization(e.to_string())),
            }
        }
    }
}

/// A cloneable handle to a connection's write half, for tasks (fanout
/// pushers, the intercept offer path) that write frames outside the
/// connection's own read loop.
#[derive(Clone)]
pub struct FrameWriter {
    write_half: Arc<Mutex<OwnedWriteHalf>>,
}

impl FrameWriter {
    pub async fn send_frame<T: Serialize + Sync>(&self, value: &T) -> Result<(), DispatchError> {
        let bytes = dcs_protocol::encode_frame(value)
            .map_err(|e| DispatchError::Protocol(e.to_string()))?;
        let mut write_half = self.write_half.lock().await;
        write_half.write_all(&bytes).await?;
        Ok(())
    }
}

/// Decode a raw frame value as a [`dcs_protocol::Command`]. An object whose
/// `command` field names a tag this build doesn't recognize reports
/// `UnknownCommand` instead of falling through to a generic deserialization
/// failure, so the two wire error kinds stay distinguishable.
pub fn decode_command(value: Value) -> Result<dcs_protocol::Command, DispatchError> {
    if let Some(name) = value.get("command").and_then(Value::as_str) {
        if !dcs_protocol::Command::is_known_name(name) {
            return Err(DispatchError::UnknownCommand(name.to_owned()));
        }
    }
    serde_json::from_value(value).map_err(|e| DispatchError::Deserialization(e.to_string()))
}
