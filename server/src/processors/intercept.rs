use dcs_protocol::{ClientHello, Command, ErrorType, Response, Verdict};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::connection::Connection;
use crate::intercept::Offer;
use crate::model_lock::LockGuard;
use crate::processors::command::handle_command;
use crate::state::AppState;

/// Offers are delivered one at a time per `spec.md` §4.4's single-threaded
/// state machine; a small bound just keeps `InterceptRegistry::offer` from
/// blocking indefinitely if this connection falls behind.
const OFFER_CHANNEL_CAPACITY: usize = 8;

/// Drives an Intercept-mode connection through `{Idle, Offered,
/// AwaitingVerdict, Resolving}` (`spec.md` §4.4). `Offered`/`Resolving` are
/// folded into the transition itself below rather than tracked as their own
/// loop states, since nothing can observe them mid-transition on a single
/// task.
pub async fn run(mut connection: Connection, client_hello: ClientHello, state: AppState) {
    let options = client_hello.intercept_options.unwrap_or_default();
    let (offer_tx, mut offer_rx) = mpsc::channel::<Offer>(OFFER_CHANNEL_CAPACITY);
    state.interceptors.register(connection.id, options, offer_tx).await;

    let mut held_lock: Option<LockGuard<'_>> = None;

    'idle: loop {
        tokio::select! {
            biased;
            offer = offer_rx.recv() => {
                let Some(offer) = offer else { break 'idle };
                if connection.send_frame(&offer.code).await.is_err() {
                    let _ = offer.verdict_tx.send(Verdict::Ignore);
                    break 'idle;
                }
                if !await_verdict(&mut connection, offer, &state, &mut held_lock).await {
                    break 'idle;
                }
            }
            frame = connection.recv_frame::<Value>() => {
                match frame {
                    Ok(Some(value)) => {
                        if is_verdict_shaped(&value) {
                            warn!(connection_id = connection.id, "verdict received with no offer outstanding");
                            let response = Response::error(
                                ErrorType::ProtocolError,
                                "verdict received with no intercept offer outstanding",
                            );
                            let _ = connection.send_frame(&response).await;
                            break 'idle;
                        }
                        if !handle_auxiliary(value, &connection, &state, &mut held_lock).await {
                            break 'idle;
                        }
                    }
                    Ok(None) => break 'idle,
                    Err(e) => {
                        let response = Response::error(e.error_type(), e.to_string());
                        let _ = connection.send_frame(&response).await;
                        if e.is_fatal() {
                            break 'idle;
                        }
                    }
                }
            }
        }
    }

    if let Some(guard) = held_lock.take() {
        guard.release_now().await;
    }
}

/// Read frames until a verdict arrives for `offer`, answering every other
/// frame as an auxiliary command first. Returns `false` once the connection
/// should close (disconnect, protocol fault, or a desynced verdict).
async fn await_verdict(
    connection: &mut Connection,
    offer: Offer,
    state: &AppState,
    held_lock: &mut Option<LockGuard<'_>>,
) -> bool {
    loop {
        match connection.recv_frame::<Value>().await {
            Ok(Some(value)) => {
                if is_verdict_shaped(&value) {
                    return match serde_json::from_value::<Verdict>(value) {
                        Ok(verdict) => {
                            let _ = offer.verdict_tx.send(verdict);
                            true
                        }
                        Err(e) => {
                            // A verdict that fails to decode desyncs the
                            // offer/verdict FIFO pairing for good, so this
                            // is fatal rather than just-report-and-continue
                            // (`spec.md` §7's DeserializationError carve-out
                            // for intercept verdicts).
                            let _ = offer.verdict_tx.send(Verdict::Ignore);
                            let response = Response::error(ErrorType::DeserializationError, e.to_string());
                            let _ = connection.send_frame(&response).await;
                            false
                        }
                    };
                }
                if !handle_auxiliary(value, connection, state, held_lock).await {
                    let _ = offer.verdict_tx.send(Verdict::Ignore);
                    return false;
                }
            }
            Ok(None) => {
                // Disconnect while AwaitingVerdict is equivalent to Ignore.
                let _ = offer.verdict_tx.send(Verdict::Ignore);
                return false;
            }
            Err(e) => {
                let _ = offer.verdict_tx.send(Verdict::Ignore);
                let response = Response::error(e.error_type(), e.to_string());
                let _ = connection.send_frame(&response).await;
                return false;
            }
        }
    }
}

fn is_verdict_shaped(value: &Value) -> bool {
    matches!(value.get("command").and_then(Value::as_str), Some("Ignore" | "Cancel" | "Resolve"))
}

async fn handle_auxiliary(
    value: Value,
    connection: &Connection,
    state: &AppState,
    held_lock: &mut Option<LockGuard<'_>>,
) -> bool {
    let command: Command = match crate::connection::decode_command(value) {
        Ok(command) => command,
        Err(e) => {
            let response = Response::error(e.error_type(), e.to_string());
            return connection.send_frame(&response).await.is_ok();
        }
    };
    let response = handle_command(&command, connection, state, held_lock).await;
    connection.send_frame(&response).await.is_ok()
}
