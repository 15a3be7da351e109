#[path = "support.rs"]
mod support;

use dcs_protocol::{
    ClientHello, CodeChannel, CodeResult, Command, InterceptOptions, InterceptStage, InterceptedCode, Mode, Permission,
    Verdict,
};
use dcs_test_utils::MockClient;
use serde_json::json;
use std::collections::HashSet;

/// An Intercept connection filtering on `PreCode`/`Http` resolves an
/// offered G28 itself; the originating Command connection observes the
/// resolved result rather than whatever the pipeline would have produced.
#[tokio::test]
async fn a_precode_interceptor_can_resolve_a_code_before_it_reaches_the_pipeline() {
    let socket_path = support::socket_in_temp_dir("s4");
    let config = support::config_with_permissions(
        socket_path.clone(),
        &[Permission::CommandExecution],
    );
    let server = support::RunningServer::start(config, json!({})).await;

    let mut interceptor = MockClient::connect(&socket_path).await.unwrap();
    let intercept_hello = ClientHello {
        mode: Mode::Intercept,
        version: dcs_protocol::PROTOCOL_VERSION,
        plugin: None,
        permissions: Some(HashSet::new()),
        subscribe_options: None,
        intercept_options: Some(InterceptOptions {
            channels: Some([CodeChannel::Http].into_iter().collect()),
            stages: Some([InterceptStage::PreCode].into_iter().collect()),
            m_codes: None,
        }),
    };
    let response = interceptor.handshake(intercept_hello).await.unwrap();
    assert!(response.success);

    let mut originator = MockClient::connect(&socket_path).await.unwrap();
    originator.handshake(support::command_hello([Permission::CommandExecution])).await.unwrap();
    originator.send(&Command::Code { channel: CodeChannel::Http, code: "G28".into() }).await.unwrap();

    let offered_raw: serde_json::Value = interceptor.recv_value().await.unwrap();
    assert_eq!(offered_raw["channel"], "HTTP");
    let offered: InterceptedCode = serde_json::from_value(offered_raw).unwrap();
    assert_eq!(offered.channel, CodeChannel::Http);
    assert_eq!(offered.major_number, Some(28));
    assert_eq!(offered.stage, Some(InterceptStage::PreCode));

    interceptor
        .send(&Verdict::Resolve { result: CodeResult { content: Some("ok\n".into()) } })
        .await
        .unwrap();

    let reply: serde_json::Value = originator.recv_value().await.unwrap();
    assert_eq!(reply, json!({"success": true, "result": {"content": "ok\n"}}));

    server.shutdown().await;
}
