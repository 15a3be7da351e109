use dcs_protocol::{Command, Response};
use tracing::{info, warn};

use crate::connection::Connection;
use crate::dispatcher::dispatch;
use crate::error::DispatchError;
use crate::model_lock::LockGuard;
use crate::state::AppState;

/// Strict request/response loop: read one command, dispatch it, write one
/// response, repeat until EOF. A fatal [`DispatchError`] writes a
/// best-effort error frame and ends the connection; anything else becomes
/// an error response and the loop continues.
pub async fn run(mut connection: Connection, state: AppState) {
    let mut held_lock: Option<LockGuard<'_>> = None;

    loop {
        let command = match connection.recv_command().await {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(e) => {
                warn!(connection_id = connection.id, error = %e, "command frame error");
                let response = Response::error(e.error_type(), e.to_string());
                let _ = connection.send_frame(&response).await;
                if e.is_fatal() {
                    break;
                }
                continue;
            }
        };

        let response = handle_command(&command, &connection, &state, &mut held_lock).await;
        if connection.send_frame(&response).await.is_err() {
            break;
        }
    }

    if let Some(guard) = held_lock.take() {
        guard.release_now().await;
    }
    info!(connection_id = connection.id, "command connection closed");
}

pub(crate) async fn handle_command<'c>(
    command: &Command,
    connection: &'c Connection,
    state: &'c AppState,
    held_lock: &mut Option<LockGuard<'c>>,
) -> Response {
    // LockObjectModel/UnlockObjectModel hold state across multiple command
    // frames (the lock outlives a single dispatch call), so the processor
    // — not the dispatcher — owns the guard.
    match command {
        Command::LockObjectModel => {
            if !connection.permissions.contains(&dcs_protocol::Permission::ObjectModelReadWrite) {
                return error_response(DispatchError::PermissionDenied {
                    command: "LockObjectModel",
                    required: dcs_protocol::Permission::ObjectModelReadWrite,
                });
            }
            if held_lock.is_some() {
                return error_response(DispatchError::AlreadyHeld);
            }
            match state
                .model_lock
                .acquire(connection.id, state.config.lock_wait_timeout(), &connection.cancellation)
                .await
            {
                Ok(guard) => {
                    *held_lock = Some(guard);
                    Response::void()
                }
                Err(crate::model_lock::AcquireError::AlreadyHeld) => error_response(DispatchError::AlreadyHeld),
                Err(crate::model_lock::AcquireError::Cancelled) => error_response(DispatchError::Cancelled),
            }
        }
        Command::UnlockObjectModel => {
            if !connection.permissions.contains(&dcs_protocol::Permission::ObjectModelReadWrite) {
                return error_response(DispatchError::PermissionDenied {
                    command: "UnlockObjectModel",
                    required: dcs_protocol::Permission::ObjectModelReadWrite,
                });
            }
            match held_lock.take() {
                Some(guard) => {
                    guard.release_now().await;
                    Response::void()
                }
                None => error_response(DispatchError::NotHeld),
            }
        }
        other => match dispatch(other.clone(), connection, state).await {
            Ok(value) if value.is_null() => Response::void(),
            Ok(value) => Response::value(value),
            Err(e) => error_response(e),
        },
    }
}

fn error_response(error: DispatchError) -> Response {
    let error_type = error.error_type();
    Response::error(error_type, error.to_string())
}
