//! Wire types and frame-boundary detection for the DCS control-server IPC
//! protocol: the length-agnostic concatenated-JSON framing, the hello
//! handshake, the tagged-union command/response codec, and the
//! intercept/subscribe/endpoint sub-protocols layered on top of it.
//!
//! This crate has no knowledge of sockets or async runtimes — it is pure
//! data plus pure parsing functions, so it can be unit- and contract-tested
//! without spinning up a daemon. `dcs-server` drives an actual
//! `tokio::net::UnixListener` using these types.

pub mod command;
pub mod endpoint;
pub mod error;
pub mod framing;
pub mod hello;
pub mod intercept;
pub mod mode;
pub mod response;
pub mod subscribe;

pub use command::{Command, CommandMeta};
pub use endpoint::{HttpEndpointRegistration, HttpRequestFrame, HttpResponseFrame};
pub use error::ErrorType;
pub use framing::{decode_frame, encode_frame, try_parse_frame, FrameAttempt};
pub use hello::{ClientHello, InitResponse, InterceptOptions, ServerHello, SubscribeOptions};
pub use intercept::{CodeResult, CodeType, InterceptedCode, Verdict};
pub use mode::{CodeChannel, InterceptStage, Mode, Permission, SubscribeMode};
pub use response::Response;
pub use subscribe::SubscribeClientMessage;

/// The protocol version sent in the server-hello and checked against the
/// client-hello during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;
