#[path = "support.rs"]
mod support;

use dcs_protocol::Command;
use dcs_test_utils::MockClient;
use serde_json::{json, Value};

/// Client connects, completes the hello handshake in Command mode, and the
/// connection stays open and usable afterward.
#[tokio::test]
async fn hello_handshake_leaves_the_connection_open_in_command_mode() {
    let socket_path = support::socket_in_temp_dir("s1");
    let config = support::config_with_permissions(socket_path.clone(), &[dcs_protocol::Permission::ObjectModelRead]);
    let server = support::RunningServer::start(config, json!({})).await;

    let mut client = MockClient::connect(&socket_path).await.unwrap();
    let hello = support::command_hello([dcs_protocol::Permission::ObjectModelRead]);
    let response = client.handshake(hello).await.unwrap();

    assert!(response.success);
    assert!(response.session_id.is_some());
    assert!(response.error_message.is_none());

    client.send(&Command::GetObjectModel).await.unwrap();
    let reply: Value = client.recv_value().await.unwrap();
    assert_eq!(reply, json!({"success": true, "result": {}}));

    server.shutdown().await;
}
