//! Frame boundary detection for the concatenated-JSON wire format.
//!
//! A frame is the shortest prefix of a byte buffer that parses as a
//! complete, well-formed JSON value. There is no length prefix and no
//! delimiter between frames; the JSON parser itself decides where one
//! frame ends and the next begins.
//!
//! This module is deliberately transport-agnostic (no `tokio`, no sockets)
//! so the boundary-detection logic can be unit tested on plain byte slices;
//! the async read loop that feeds it bytes lives in `dcs-server`.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Outcome of attempting to carve one frame off the front of a buffer.
#[derive(Debug)]
pub enum FrameAttempt {
    /// A complete value was parsed. `consumed` bytes should be drained from
    /// the front of the buffer before the next attempt.
    Complete { value: Value, consumed: usize },
    /// The buffer holds a well-formed-so-far prefix of a JSON value but not
    /// enough bytes to finish it. Callers should read more and retry.
    Incomplete,
}

/// Attempt to parse the first JSON value out of `buf`.
///
/// Returns [`FrameAttempt::Incomplete`] for a truncated value (more bytes
/// needed) and an error for a fragment that can never become valid JSON
/// (this is the `DeserializationError` / `ProtocolError` boundary case).
pub fn try_parse_frame(buf: &[u8]) -> Result<FrameAttempt, serde_json::Error> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => {
            let consumed = stream.byte_offset();
            Ok(FrameAttempt::Complete { value, consumed })
        }
        Some(Err(e)) if e.is_eof() => Ok(FrameAttempt::Incomplete),
        Some(Err(e)) => Err(e),
        None => Ok(FrameAttempt::Incomplete),
    }
}

/// Parse a complete buffer into a typed value, for callers (tests, mock
/// clients) that already hold exactly one frame's bytes.
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Serialize a value into its on-wire frame bytes (no trailing separator —
/// frames are concatenated with no delimiter).
pub fn encode_frame<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}
