use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::mode::{CodeChannel, InterceptStage, Mode, Permission, SubscribeMode};

/// First frame written by the server, unsolicited, as soon as a connection
/// is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    pub version: u32,
}

/// Filter declared by an Intercept-mode client in `intercept-options`.
/// Default (all fields `None`/empty) means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<HashSet<CodeChannel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<HashSet<InterceptStage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_codes: Option<HashSet<u32>>,
}

impl InterceptOptions {
    pub fn matches(&self, channel: CodeChannel, stage: InterceptStage, m_code: Option<u32>) -> bool {
        if let Some(channels) = &self.channels {
            if !channels.contains(&channel) {
                return false;
            }
        }
        if let Some(stages) = &self.stages {
            if !stages.contains(&stage) {
                return false;
            }
        }
        if let Some(m_codes) = &self.m_codes {
            match m_code {
                Some(code) if m_codes.contains(&code) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Options declared by a Subscribe-mode client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    pub mode: SubscribeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<String>>,
}

/// First frame written by the client, in response to the server-hello.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHello {
    pub mode: Mode,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<HashSet<Permission>>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "subscribe-options")]
    pub subscribe_options: Option<SubscribeOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "intercept-options")]
    pub intercept_options: Option<InterceptOptions>,
}

/// Server's reply to the client-hello. `success:false` is always followed
/// by the server closing the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<u32>,
}

impl InitResponse {
    pub fn ok(session_id: u32) -> Self {
        Self { success: true, error_message: None, session_id: Some(session_id) }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, error_message: Some(message.into()), session_id: None }
    }
}
