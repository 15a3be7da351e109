use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use dcs_protocol::{HttpEndpointRegistration, HttpRequestFrame, HttpResponseFrame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Build the side-channel socket path for a registration, following
/// `spec.md` §6's `<ns>-<method>-<hash>.sock` naming.
pub fn socket_path(base_dir: &Path, registration: &HttpEndpointRegistration) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    registration.http_method.hash(&mut hasher);
    registration.namespace.hash(&mut hasher);
    registration.path.hash(&mut hasher);
    let hash = hasher.finish();
    base_dir.join(format!(
        "{}-{}-{:x}.sock",
        registration.namespace,
        registration.http_method.to_lowercase(),
        hash
    ))
}

/// Bind a fresh listener at `registration`'s socket path, removing any
/// stale socket file left behind by a previous daemon instance.
pub fn bind(base_dir: &Path, registration: &HttpEndpointRegistration) -> std::io::Result<(PathBuf, UnixListener)> {
    std::fs::create_dir_all(base_dir)?;
    let path = socket_path(base_dir, registration);
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    let listener = UnixListener::bind(&path)?;
    Ok((path, listener))
}

/// Run the accept loop for one endpoint's dedicated socket until `shutdown`
/// fires or the owning Plugin connection's cleanup drops the listener.
///
/// The framing here (`spec.md` §4.6) is a distinct HTTP bridge, not the
/// command protocol: the external front-end writes an [`HttpRequestFrame`],
/// optionally streams a body, and reads back an [`HttpResponseFrame`].
/// Bridging to an actual plugin HTTP handler is the web front-end's job and
/// out of scope for this workspace (`spec.md` §1); this loop answers every
/// request with a stub `501 Not Implemented` so the framing contract itself
/// is exercised end-to-end without a real handler behind it.
pub async fn serve(listener: UnixListener, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else { continue };
                tokio::spawn(bridge_one_request(stream));
            }
        }
    }
}

async fn bridge_one_request(mut stream: UnixStream) {
    let mut buf = Vec::new();
    let request: HttpRequestFrame = match read_frame(&mut stream, &mut buf).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "malformed endpoint request frame");
            return;
        }
    };

    if request.body_length > 0 {
        let mut body = vec![0u8; request.body_length as usize];
        if let Err(e) = drain_body(&mut stream, &mut buf, &mut body).await {
            warn!(error = %e, "failed to read endpoint request body");
            return;
        }
    }

    let response = HttpResponseFrame { status_code: 501, headers: Default::default(), body_length: 0 };
    if let Ok(bytes) = dcs_protocol::encode_frame(&response) {
        let _ = stream.write_all(&bytes).await;
    }
}

async fn read_frame<T: serde::de::DeserializeOwned>(
    stream: &mut UnixStream,
    buf: &mut Vec<u8>,
) -> Result<Option<T>, serde_json::Error> {
    loop {
        match dcs_protocol::try_parse_frame(buf)? {
            dcs_protocol::FrameAttempt::Complete { value, consumed } => {
                let typed = serde_json::from_value(value)?;
                buf.drain(..consumed);
                return Ok(Some(typed));
            }
            dcs_protocol::FrameAttempt::Incomplete => {
                let mut chunk = [0u8; 4096];
                let n = match stream.read(&mut chunk).await {
                    Ok(n) => n,
                    Err(_) => return Ok(None),
                };
                if n == 0 {
                    return Ok(None);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

async fn drain_body(stream: &mut UnixStream, buf: &mut Vec<u8>, out: &mut [u8]) -> std::io::Result<()> {
    let take = buf.len().min(out.len());
    out[..take].copy_from_slice(&buf[..take]);
    buf.drain(..take);
    let mut filled = take;
    while filled < out.len() {
        let n = stream.read(&mut out[filled..]).await?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed mid-body"));
        }
        filled += n;
    }
    Ok(())
}
