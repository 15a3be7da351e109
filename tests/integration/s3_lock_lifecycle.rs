#[path = "support.rs"]
mod support;

use std::time::Duration;

use dcs_protocol::{Command, Permission};
use dcs_test_utils::MockClient;
use serde_json::{json, Value};

/// Two Command connections contend for the object-model lock: the second
/// acquirer blocks until the first disconnects, then is granted the lock
/// as the very next thing it receives.
#[tokio::test]
async fn second_locker_is_granted_the_lock_once_the_first_disconnects() {
    let socket_path = support::socket_in_temp_dir("s3");
    let config =
        support::config_with_permissions(socket_path.clone(), &[Permission::ObjectModelReadWrite]);
    let server = support::RunningServer::start(config, json!({})).await;

    let mut a = MockClient::connect(&socket_path).await.unwrap();
    a.handshake(support::command_hello([Permission::ObjectModelReadWrite])).await.unwrap();
    let mut b = MockClient::connect(&socket_path).await.unwrap();
    b.handshake(support::command_hello([Permission::ObjectModelReadWrite])).await.unwrap();

    a.send(&Command::LockObjectModel).await.unwrap();
    let reply: Value = a.recv_value().await.unwrap();
    assert_eq!(reply, json!({"success": true}));

    b.send(&Command::LockObjectModel).await.unwrap();
    let still_waiting = tokio::time::timeout(Duration::from_millis(150), b.recv_value()).await;
    assert!(still_waiting.is_err(), "B should not be granted the lock while A still holds it");

    a.close().await.unwrap();

    let reply: Value =
        tokio::time::timeout(Duration::from_secs(2), b.recv_value()).await.expect("B granted the lock").unwrap();
    assert_eq!(reply, json!({"success": true}));
    assert_eq!(server.state.model_lock.holder().await, Some(2));

    server.shutdown().await;
}
