#[path = "support.rs"]
mod support;

use std::time::Duration;

use dcs_protocol::{ClientHello, Mode, SubscribeClientMessage, SubscribeMode, SubscribeOptions};
use dcs_test_utils::MockClient;
use serde_json::{json, Value};

/// A Patch-mode subscriber filtered to `["state"]` gets the full snapshot as
/// frame 0, a filtered merge-patch when a subscribed key changes, and no
/// frame at all when only an unsubscribed key changes.
#[tokio::test]
async fn patch_subscriber_only_sees_changes_to_its_subscribed_keys() {
    let socket_path = support::socket_in_temp_dir("s5");
    let initial = json!({"state": {"status": "idle"}, "heat": {"heaters": []}});
    let config = support::config_with_permissions(socket_path.clone(), &[]);
    let server = support::RunningServer::start(config, initial.clone()).await;

    let mut subscriber = MockClient::connect(&socket_path).await.unwrap();
    let hello = ClientHello {
        mode: Mode::Subscribe,
        version: dcs_protocol::PROTOCOL_VERSION,
        plugin: None,
        permissions: None,
        subscribe_options: Some(SubscribeOptions { mode: SubscribeMode::Patch, filter: Some(vec!["state".into()]) }),
        intercept_options: None,
    };
    let response = subscriber.handshake(hello).await.unwrap();
    assert!(response.success);

    let frame0: Value = subscriber.recv_value().await.unwrap();
    assert_eq!(frame0, initial);
    subscriber.send(&SubscribeClientMessage::Acknowledge).await.unwrap();

    server
        .state
        .publish_model(json!({"state": {"status": "printing"}, "heat": {"heaters": []}}))
        .await;
    let patch: Value = subscriber.recv_value().await.unwrap();
    assert_eq!(patch, json!({"state": {"status": "printing"}}));
    subscriber.send(&SubscribeClientMessage::Acknowledge).await.unwrap();

    server
        .state
        .publish_model(json!({"state": {"status": "printing"}, "heat": {"heaters": [1]}}))
        .await;
    let no_frame = tokio::time::timeout(Duration::from_millis(150), subscriber.recv_value()).await;
    assert!(no_frame.is_err(), "a heat-only change should produce no frame once filtered");

    server.shutdown().await;
}
