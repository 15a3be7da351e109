use dcs_protocol::{ClientHello, Command, ErrorType, HttpEndpointRegistration, Response};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::connection::Connection;
use crate::endpoint_socket;
use crate::state::{AppState, EndpointError};

/// Registers one `{httpMethod, namespace, path, isUpload}` tuple and stands
/// up its dedicated side-channel socket for the connection's lifetime. The
/// first (and only command-protocol) frame on a PluginHttpEndpoint
/// connection must be `AddHttpEndpoint`; after that, this socket carries no
/// further command-protocol traffic — everything else happens on the
/// dedicated endpoint socket this processor creates.
pub async fn run(mut connection: Connection, _client_hello: ClientHello, state: AppState) {
    let registration = match connection.recv_command().await {
        Ok(Some(Command::AddHttpEndpoint { http_method, namespace, path, is_upload })) => {
            HttpEndpointRegistration { http_method, namespace, path, is_upload }
        }
        Ok(Some(_)) => {
            let response = Response::error(ErrorType::WrongMode, "expected AddHttpEndpoint as the first frame");
            let _ = connection.send_frame(&response).await;
            return;
        }
        Ok(None) => return,
        Err(e) => {
            let response = Response::error(e.error_type(), e.to_string());
            let _ = connection.send_frame(&response).await;
            return;
        }
    };

    if let Err(err) = state.register_endpoint(connection.id, registration.clone()).await {
        // `spec.md` §4.6 names `NamespaceReserved`/`AlreadyRegistered` as
        // this mode's own error kinds; §7's closed `errorType` set has no
        // matching variants, so they map onto the nearest existing ones
        // (`InvalidArgument`, `AlreadyExists`) rather than growing the wire
        // vocabulary for one handshake path.
        let error_type = match err {
            EndpointError::NamespaceReserved => ErrorType::InvalidArgument,
            EndpointError::AlreadyRegistered => ErrorType::AlreadyExists,
        };
        let response = Response::error(error_type, err.to_string());
        let _ = connection.send_frame(&response).await;
        return;
    }

    let base_dir = state
        .config
        .socket_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("/var/run/dsf"))
        .to_path_buf();

    let (socket_path, listener) = match endpoint_socket::bind(&base_dir, &registration) {
        Ok(pair) => pair,
        Err(e) => {
            state.unregister_endpoint(connection.id).await;
            let response = Response::error(ErrorType::IoError, e.to_string());
            let _ = connection.send_frame(&response).await;
            return;
        }
    };

    let bridge_shutdown = CancellationToken::new();
    let bridge_task = tokio::spawn(endpoint_socket::serve(listener, bridge_shutdown.clone()));

    let response = Response::value(json!({ "socketPath": socket_path.to_string_lossy() }));
    if connection.send_frame(&response).await.is_err() {
        bridge_shutdown.cancel();
        let _ = bridge_task.await;
        let _ = std::fs::remove_file(&socket_path);
        return;
    }

    info!(connection_id = connection.id, path = %socket_path.display(), "http endpoint registered");

    // Nothing further is expected on the registering socket; hold it open
    // (watching only for disconnect) until the plugin goes away, at which
    // point the registration and its socket are removed atomically.
    while connection.recv_frame::<serde_json::Value>().await.unwrap_or(None).is_some() {}

    bridge_shutdown.cancel();
    let _ = bridge_task.await;
    let _ = std::fs::remove_file(&socket_path);
}
