use dcs_protocol::{CodeChannel, CodeResult, Command, InterceptStage, InterceptedCode, Mode, Verdict};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::error::DispatchError;
use crate::gcode::parse_code_type;
use crate::model::apply_merge_patch;
use crate::state::{AppState, PluginRecord, PluginStatus, UserSession};

/// Resolve, permission-check, mode-check, and invoke one command. This is
/// the dispatcher's entire public surface: handlers never see a
/// connection's permission set directly, only what this function already
/// decided they're allowed to do.
pub async fn dispatch(
    command: Command,
    connection: &Connection,
    state: &AppState,
) -> Result<Value, DispatchError> {
    let meta = command.meta();

    if !meta.allowed_modes.contains(&connection.mode) {
        return Err(DispatchError::WrongMode { command: meta.name });
    }

    for required in meta.required_permissions {
        if !connection.permissions.contains(required) {
            return Err(DispatchError::PermissionDenied { command: meta.name, required: *required });
        }
    }

    if meta.lock_implicit {
        let guard = state
            .model_lock
            .acquire(connection.id, state.config.lock_wait_timeout(), &connection.cancellation)
            .await
            .map_err(|e| match e {
                crate::model_lock::AcquireError::AlreadyHeld => DispatchError::AlreadyHeld,
                crate::model_lock::AcquireError::Cancelled => DispatchError::Cancelled,
            })?;
        let result = invoke(command, connection, state).await;
        guard.release_now().await;
        result
    } else {
        invoke(command, connection, state).await
    }
}

async fn invoke(command: Command, connection: &Connection, state: &AppState) -> Result<Value, DispatchError> {
    match command {
        Command::Code { channel, code } | Command::SimpleCode { channel, code } => {
            let result = execute_code(state, channel, code, &connection.cancellation).await?;
            Ok(serde_json::to_value(result).expect("CodeResult always serializes"))
        }
        Command::Flush { channel } => {
            state.pipeline.flush(channel, &connection.cancellation).await?;
            Ok(Value::Null)
        }
        Command::EvaluateExpression { channel, expression } => {
            state.pipeline.evaluate_expression(channel, &expression, &connection.cancellation).await
        }

        Command::GetObjectModel => Ok(state.current_model()),

        Command::LockObjectModel => {
            // The dispatcher already holds the lock for lock-implicit
            // commands; an explicit `LockObjectModel` acquires one that
            // outlives this single dispatch call, so it is handled by the
            // Command processor directly rather than here. Reaching this
            // arm means the processor routed it incorrectly.
            Err(DispatchError::Protocol(
                "LockObjectModel must be handled by the command processor, not the dispatcher".to_owned(),
            ))
        }
        Command::UnlockObjectModel => Err(DispatchError::Protocol(
            "UnlockObjectModel must be handled by the command processor, not the dispatcher".to_owned(),
        )),

        Command::PatchObjectModel { key, patch } => {
            let mut model = state.current_model();
            apply_merge_patch(&mut model, &json!({ key: patch }));
            state.publish_model(model).await;
            Ok(Value::Null)
        }
        Command::SetObjectModel { key, value } => {
            let mut model = state.current_model();
            apply_merge_patch(&mut model, &json!({ key: value }));
            state.publish_model(model).await;
            Ok(Value::Null)
        }
        Command::SyncObjectModel => Ok(state.current_model()),

        Command::GetFileInfo { path } => Ok(json!({ "path": path, "size": 0, "lastModified": Value::Null })),
        Command::ResolvePath { path } => Ok(Value::String(path)),

        Command::AddUserSession { access_level, origin } => {
            let session_id = state.next_session_id();
            state
                .sessions
                .write()
                .await
                .insert(session_id, UserSession { access_level, origin });
            Ok(json!(session_id))
        }
        Command::RemoveUserSession { session_id } => {
            let removed = state.sessions.write().await.remove(&session_id).is_some();
            if removed {
                Ok(Value::Null)
            } else {
                Err(DispatchError::NotFound(format!("user session {session_id}")))
            }
        }

        Command::AddHttpEndpoint { .. } => Err(DispatchError::Protocol(
            "HTTP endpoint registration happens during the PluginHttpEndpoint handshake, not dispatch".to_owned(),
        )),
        Command::RemoveHttpEndpoint { http_method, namespace, path } => {
            let target = dcs_protocol::HttpEndpointRegistration {
                http_method,
                namespace,
                path,
                is_upload: false,
            };
            let removed = {
                let mut endpoints = state.endpoints.write().await;
                let owner = endpoints
                    .iter()
                    .find(|(_, registration)| registration.same_tuple_as(&target))
                    .map(|(id, _)| *id);
                owner.map(|id| endpoints.remove(&id))
            };
            if removed.is_some() {
                Ok(Value::Null)
            } else {
                Err(DispatchError::NotFound("http endpoint".to_owned()))
            }
        }

        Command::InstallPlugin { plugin_file } => {
            let name = plugin_name_from_file(&plugin_file);
            let mut plugins = state.plugins.write().await;
            if plugins.contains_key(&name) {
                return Err(DispatchError::AlreadyExists(format!("plugin {name}")));
            }
            plugins.insert(name, PluginRecord { status: PluginStatus::Stopped, data: Default::default() });
            Ok(Value::Null)
        }
        Command::StartPlugin { plugin } => set_plugin_status(state, &plugin, PluginStatus::Started).await,
        Command::StopPlugin { plugin } => set_plugin_status(state, &plugin, PluginStatus::Stopped).await,
        Command::UninstallPlugin { plugin } => {
            let removed = state.plugins.write().await.remove(&plugin).is_some();
            if removed {
                Ok(Value::Null)
            } else {
                Err(DispatchError::NotFound(format!("plugin {plugin}")))
            }
        }
        Command::SetPluginData { plugin, key, value } => {
            let mut plugins = state.plugins.write().await;
            let record = plugins.get_mut(&plugin).ok_or_else(|| DispatchError::NotFound(format!("plugin {plugin}")))?;
            record.data.insert(key, value);
            Ok(Value::Null)
        }

        Command::WriteMessage { message } => {
            tracing::info!(connection_id = connection.id, "{message}");
            Ok(Value::Null)
        }
        Command::SetUpdateStatus { updating } => {
            state.updating.store(updating, std::sync::atomic::Ordering::Relaxed);
            Ok(Value::Null)
        }
    }
}

async fn set_plugin_status(state: &AppState, plugin: &str, status: PluginStatus) -> Result<Value, DispatchError> {
    let mut plugins = state.plugins.write().await;
    let record = plugins.get_mut(plugin).ok_or_else(|| DispatchError::NotFound(format!("plugin {plugin}")))?;
    record.status = status;
    Ok(Value::Null)
}

fn plugin_name_from_file(plugin_file: &str) -> String {
    std::path::Path::new(plugin_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| plugin_file.to_owned())
}

/// Route a code through `spec.md` §4.4's three intercept stages around the
/// pipeline submission. `PreCode` and `PostCode` interceptors can resolve or
/// cancel the code before it ever reaches the pipeline; `ExecutedCode`
/// interceptors observe (and may override) the result after the fact. A
/// `Cancel` verdict at `ExecutedCode` has no code left to cancel, so it is
/// logged and the already-executed result is returned unchanged — the
/// source leaves this case unspecified (`spec.md` §9's open questions).
async fn execute_code(
    state: &AppState,
    channel: CodeChannel,
    code: String,
    cancellation: &CancellationToken,
) -> Result<CodeResult, DispatchError> {
    let (code_type, major_number, minor_number) = parse_code_type(&code);
    let intercepted = InterceptedCode { code_type, major_number, minor_number, channel, stage: None };

    for stage in [InterceptStage::PreCode, InterceptStage::PostCode] {
        match state.interceptors.offer(stage, intercepted.clone()).await {
            Some(Verdict::Resolve { result }) => return Ok(result),
            Some(Verdict::Cancel) => return Err(DispatchError::Cancelled),
            Some(Verdict::Ignore) | None => {}
        }
    }

    let result = state.pipeline.submit_code(channel, &code, cancellation).await?;

    match state.interceptors.offer(InterceptStage::ExecutedCode, intercepted).await {
        Some(Verdict::Resolve { result }) => Ok(result),
        Some(Verdict::Cancel) => {
            tracing::warn!(?channel, "ExecutedCode interceptor cancelled an already-executed code; ignoring");
            Ok(result)
        }
        Some(Verdict::Ignore) | None => Ok(result),
    }
}

/// Whether `mode` is ever eligible to receive a given command kind, used by
/// the Command processor to short-circuit obviously-wrong-mode requests
/// before constructing a full dispatch call.
pub fn is_allowed_in(command: &Command, mode: Mode) -> bool {
    command.meta().allowed_modes.contains(&mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PeerIdentity;
    use crate::code_channel::LoopbackPipeline;
    use dcs_protocol::{CodeChannel, Permission};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::net::UnixListener;

    async fn test_connection(permissions: HashSet<Permission>, mode: Mode) -> Connection {
        let dir = std::env::temp_dir().join(format!("dcs-dispatch-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("s.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();
        let client = tokio::net::UnixStream::connect(&sock_path).await.unwrap();
        let (server_stream, _) = listener.accept().await.unwrap();
        std::mem::forget(client);
        let identity = PeerIdentity { uid: 0, pid: 1 };
        let (read_half, write_half) = server_stream.into_split();
        Connection::new(1, identity, permissions, mode, read_half, write_half, CancellationToken::new())
    }

    fn test_state() -> AppState {
        AppState::new(crate::config::Config::default(), Arc::new(LoopbackPipeline), json!({}))
    }

    #[tokio::test]
    async fn permission_denied_for_a_command_lacking_its_required_permission() {
        let connection = test_connection(HashSet::new(), Mode::Command).await;
        let state = test_state();
        let err = dispatch(Command::InstallPlugin { plugin_file: "x.zip".into() }, &connection, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::PermissionDenied { required: Permission::ManagePlugins, .. }));
    }

    #[tokio::test]
    async fn wrong_mode_for_a_plugin_http_endpoint_only_command() {
        let connection =
            test_connection([Permission::RegisterHttpEndpoints].into_iter().collect(), Mode::Command).await;
        let state = test_state();
        let err = dispatch(
            Command::AddHttpEndpoint {
                http_method: "GET".into(),
                namespace: "x".into(),
                path: "y".into(),
                is_upload: false,
            },
            &connection,
            &state,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::WrongMode { .. }));
    }

    #[tokio::test]
    async fn code_execution_routes_through_the_pipeline() {
        let connection = test_connection([Permission::CommandExecution].into_iter().collect(), Mode::Command).await;
        let state = test_state();
        let result = dispatch(
            Command::Code { channel: CodeChannel::Sbc, code: "G28".into() },
            &connection,
            &state,
        )
        .await
        .unwrap();
        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn patch_object_model_merges_under_the_given_key_and_publishes() {
        let connection =
            test_connection([Permission::ObjectModelReadWrite].into_iter().collect(), Mode::Command).await;
        let state = test_state();
        dispatch(
            Command::PatchObjectModel { key: "state".into(), patch: json!({"status": "printing"}) },
            &connection,
            &state,
        )
        .await
        .unwrap();
        assert_eq!(state.current_model(), json!({"state": {"status": "printing"}}));
    }

    #[tokio::test]
    async fn install_then_start_plugin_tracks_status() {
        let connection = test_connection([Permission::ManagePlugins].into_iter().collect(), Mode::Command).await;
        let state = test_state();
        dispatch(Command::InstallPlugin { plugin_file: "foo.zip".into() }, &connection, &state).await.unwrap();
        dispatch(Command::StartPlugin { plugin: "foo".into() }, &connection, &state).await.unwrap();
        let plugins = state.plugins.read().await;
        assert_eq!(plugins.get("foo").unwrap().status, PluginStatus::Started);
    }

    #[tokio::test]
    async fn removing_an_unknown_session_is_not_found() {
        let connection =
            test_connection([Permission::ManageUserSessions].into_iter().collect(), Mode::Command).await;
        let state = test_state();
        let err = dispatch(Command::RemoveUserSession { session_id: 999 }, &connection, &state).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }
}
