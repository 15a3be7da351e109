use dcs_protocol::{ClientHello, SubscribeClientMessage, SubscribeMode};
use serde_json::Value;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::state::AppState;

/// Push loop for a Subscribe-mode connection: frame 0 is always the full
/// snapshot; every subsequent push is either another full snapshot or a
/// merge-patch, per `subscribe-options.mode`. The server never pushes frame
/// N+1 before acknowledge-N arrives — that per-subscriber backpressure is
/// what the ack round trip below enforces.
pub async fn run(mut connection: Connection, client_hello: ClientHello, state: AppState) {
    // `handshake::validate` already rejected a Subscribe client-hello with
    // no `subscribe-options`, so this is always populated here.
    let Some(options) = client_hello.subscribe_options else {
        warn!(connection_id = connection.id, "subscribe connection reached the processor without options");
        return;
    };

    let initial = state.current_model();
    let subscriber = state
        .fanout
        .register(connection.id, options.mode, options.filter.clone(), initial.clone())
        .await;

    if connection.send_frame(&initial).await.is_err() {
        return;
    }
    if !await_acknowledge(&mut connection).await {
        info!(connection_id = connection.id, "subscriber disconnected before acknowledging frame 0");
        return;
    }

    loop {
        let Some(frame) = subscriber.next_frame(&connection.cancellation).await else {
            break;
        };
        if options.mode == SubscribeMode::Patch && is_empty_patch(&frame) {
            // Every changed key was filtered out; nothing to send, and
            // nothing to acknowledge, so loop straight back to waiting on
            // the next publish.
            continue;
        }
        if connection.send_frame(&frame).await.is_err() {
            break;
        }
        if !await_acknowledge(&mut connection).await {
            break;
        }
    }

    info!(connection_id = connection.id, "subscribe connection closed");
}

fn is_empty_patch(frame: &Value) -> bool {
    matches!(frame, Value::Object(map) if map.is_empty())
}

async fn await_acknowledge(connection: &mut Connection) -> bool {
    matches!(
        connection.recv_frame::<SubscribeClientMessage>().await,
        Ok(Some(SubscribeClientMessage::Acknowledge))
    )
}
