use dcs_protocol::{ClientHello, InitResponse, Mode, ServerHello};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{authorized_permissions, peer_identity, requested_permissions_are_authorized};
use crate::connection::Connection;
use crate::state::AppState;

/// Outcome of a successful handshake: a constructed [`Connection`] plus
/// whatever per-mode options the client declared, for the caller to build
/// the matching processor from.
pub struct Handshaked {
    pub connection: Connection,
    pub client_hello: ClientHello,
}

/// Perform the wire handshake on a freshly accepted socket: write
/// server-hello, read client-hello, validate, write init-response. Returns
/// `None` after writing a `success:false` init-response and closing, per
/// the protocol's "on any validation failure, write init-response with
/// success:false and close."
pub async fn perform(
    stream: UnixStream,
    state: &AppState,
    shutdown: &CancellationToken,
) -> Option<Handshaked> {
    let identity = match peer_identity(&stream) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "failed to read peer credentials");
            return None;
        }
    };

    let (mut read_half, mut write_half) = stream.into_split();

    let server_hello = ServerHello { version: state.config.protocol_version };
    if let Err(e) = write_frame(&mut write_half, &server_hello).await {
        warn!(error = %e, "failed to write server-hello");
        return None;
    }

    let connection_id = state.next_connection_id();
    let cancellation = shutdown.child_token();

    let mut buf = Vec::new();
    let client_hello: ClientHello = match read_frame(&mut read_half, &mut buf).await {
        Ok(Some(hello)) => hello,
        Ok(None) => {
            info!(connection_id, "peer closed before sending client-hello");
            return None;
        }
        Err(e) => {
            warn!(connection_id, error = %e, "failed to read client-hello");
            let _ = write_frame(
                &mut write_half,
                &InitResponse::failure(format!("malformed client-hello: {e}")),
            )
            .await;
            return None;
        }
    };

    if let Some(reason) = validate(&client_hello, state, identity) {
        info!(connection_id, reason = %reason, "handshake rejected");
        let _ = write_frame(&mut write_half, &InitResponse::failure(reason)).await;
        return None;
    }

    let authorized = authorized_permissions(&state.config, identity);
    let permissions = client_hello.permissions.clone().unwrap_or_else(|| authorized.clone());

    if let Err(e) = write_frame(&mut write_half, &InitResponse::ok(connection_id)).await {
        warn!(connection_id, error = %e, "failed to write init-response");
        return None;
    }

    // read_half/write_half were only borrowed above to perform the raw
    // hello exchange before any buffered bytes existed; Connection now
    // takes ownership and continues from the same (possibly non-empty)
    // read buffer.
    let mut connection = Connection::new(
        connection_id,
        identity,
        permissions,
        client_hello.mode,
        read_half,
        write_half,
        cancellation,
    );
    connection.seed_read_buffer(buf);

    info!(
        connection_id,
        peer_pid = connection.peer_pid,
        mode = ?connection.mode,
        "handshake complete"
    );

    Some(Handshaked { connection, client_hello })
}

fn validate(hello: &ClientHello, state: &AppState, identity: crate::auth::PeerIdentity) -> Option<String> {
    if hello.version != state.config.protocol_version {
        return Some(format!(
            "unsupported protocol version {} (server is {})",
            hello.version, state.config.protocol_version
        ));
    }
    if !matches!(
        hello.mode,
        Mode::Command | Mode::Intercept | Mode::Subscribe | Mode::PluginService | Mode::PluginHttpEndpoint
    ) {
        return Some("unrecognized mode".to_owned());
    }
    if let Some(requested) = &hello.permissions {
        let authorized = authorized_permissions(&state.config, identity);
        if !requested_permissions_are_authorized(requested, &authorized) {
            return Some("requested permissions exceed what this peer is authorized for".to_owned());
        }
    }
    if hello.mode == Mode::Subscribe && hello.subscribe_options.is_none() {
        return Some("Subscribe mode requires subscribe-options".to_owned());
    }
    None
}

async fn write_frame<T: serde::Serialize>(
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    value: &T,
) -> std::io::Result<()> {
    let bytes = dcs_protocol::encode_frame(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_half.write_all(&bytes).await
}

async fn read_frame<T: serde::de::DeserializeOwned>(
    read_half: &mut tokio::net::unix::OwnedReadHalf,
    buf: &mut Vec<u8>,
) -> Result<Option<T>, crate::error::DispatchError> {
    use tokio::io::AsyncReadExt;
    loop {
        match dcs_protocol::try_parse_frame(buf) {
            Ok(dcs_protocol::FrameAttempt::Complete { value, consumed }) => {
                buf.drain(..consumed);
                let typed = serde_json::from_value(value)
                    .map_err(|e| crate::error::DispatchError::Deserialization(e.to_string()))?;
                return Ok(Some(typed));
            }
            Ok(dcs_protocol::FrameAttempt::Incomplete) => {
                let mut chunk = [0u8; 4096];
                let n = read_half.read(&mut chunk).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) => return Err(crate::error::DispatchError::Deserialization(e.to_string())),
        }
    }
}
