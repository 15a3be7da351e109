#[path = "support.rs"]
mod support;

use dcs_protocol::{Command, ErrorType, Permission};
use dcs_test_utils::MockClient;
use serde_json::{json, Value};

/// An `AddHttpEndpoint` sent on a Command-mode connection is rejected with
/// `WrongMode`, and the connection remains usable afterward.
#[tokio::test]
async fn add_http_endpoint_on_a_command_connection_is_wrong_mode() {
    let socket_path = support::socket_in_temp_dir("s2");
    let config = support::config_with_permissions(
        socket_path.clone(),
        &[Permission::RegisterHttpEndpoints, Permission::ObjectModelRead],
    );
    let server = support::RunningServer::start(config, json!({})).await;

    let mut client = MockClient::connect(&socket_path).await.unwrap();
    let hello =
        support::command_hello([Permission::RegisterHttpEndpoints, Permission::ObjectModelRead]);
    client.handshake(hello).await.unwrap();

    client
        .send(&Command::AddHttpEndpoint {
            http_method: "GET".into(),
            namespace: "x".into(),
            path: "y".into(),
            is_upload: false,
        })
        .await
        .unwrap();
    let reply: Value = client.recv_value().await.unwrap();
    assert_eq!(reply["success"], json!(false));
    assert_eq!(reply["errorType"], json!(ErrorType::WrongMode.as_wire_str()));
    assert!(reply["errorMessage"].is_string());

    // The connection is still alive: an ordinary command still round-trips.
    client.send(&Command::GetObjectModel).await.unwrap();
    let reply: Value = client.recv_value().await.unwrap();
    assert_eq!(reply, json!({"success": true, "result": {}}));

    server.shutdown().await;
}
