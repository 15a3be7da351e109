#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dcs_protocol::{ClientHello, Mode, Permission};
use dcs_server::code_channel::LoopbackPipeline;
use dcs_server::config::Config;
use dcs_server::state::AppState;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// The uid the test process itself runs as, read off `/proc/self` rather
/// than pulled in via a `libc`/`nix` dependency just for this one lookup.
/// `peer_cred()` on the accepted socket will report the same uid, since the
/// test client and the daemon both run in this process's address space.
pub fn current_uid() -> u32 {
    std::fs::metadata("/proc/self").expect("read /proc/self").uid()
}

pub fn socket_in_temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dcs-integration-{label}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp socket dir");
    dir.join("dcs.sock")
}

/// A `Config` whose authorization table grants the test process exactly
/// `permissions` — everything else behaves as default.
pub fn config_with_permissions(socket_path: PathBuf, permissions: &[Permission]) -> Config {
    let mut authorization = HashMap::new();
    authorization.insert(current_uid(), permissions.iter().copied().collect::<HashSet<_>>());
    Config { socket_path, authorization, ..Config::default() }
}

/// A running daemon over a temp socket, its `AppState` exposed so tests can
/// inspect or mutate shared state directly (e.g. `publish_model`) alongside
/// driving it over the wire.
pub struct RunningServer {
    pub state: AppState,
    pub socket_path: PathBuf,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    pub async fn start(config: Config, initial_model: Value) -> Self {
        let socket_path = config.socket_path.clone();
        let state = AppState::new(config, Arc::new(LoopbackPipeline), initial_model);
        let shutdown = CancellationToken::new();
        let task = {
            let state = state.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { dcs_server::serve_with_state(state, shutdown).await })
        };
        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Self { state, socket_path, shutdown, task }
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), self.task).await;
    }
}

pub fn command_hello(permissions: impl IntoIterator<Item = Permission>) -> ClientHello {
    ClientHello {
        mode: Mode::Command,
        version: dcs_protocol::PROTOCOL_VERSION,
        plugin: None,
        permissions: Some(permissions.into_iter().collect()),
        subscribe_options: None,
        intercept_options: None,
    }
}
