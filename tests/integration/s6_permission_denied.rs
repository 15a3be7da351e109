#[path = "support.rs"]
mod support;

use dcs_protocol::{Command, ErrorType, Permission};
use dcs_test_utils::MockClient;
use serde_json::{json, Value};

/// A connection authorized only for `CommandExecution` is refused
/// `InstallPlugin`, which requires `ManagePlugins`.
#[tokio::test]
async fn install_plugin_without_manage_plugins_is_permission_denied() {
    let socket_path = support::socket_in_temp_dir("s6");
    let config =
        support::config_with_permissions(socket_path.clone(), &[Permission::CommandExecution]);
    let server = support::RunningServer::start(config, json!({})).await;

    let mut client = MockClient::connect(&socket_path).await.unwrap();
    client.handshake(support::command_hello([Permission::CommandExecution])).await.unwrap();

    client.send(&Command::InstallPlugin { plugin_file: "foo.zip".into() }).await.unwrap();
    let reply: Value = client.recv_value().await.unwrap();

    assert_eq!(reply["success"], json!(false));
    assert_eq!(reply["errorType"], json!(ErrorType::PermissionDenied.as_wire_str()));
    assert!(reply["errorMessage"].as_str().unwrap().contains("ManagePlugins"));

    server.shutdown().await;
}
