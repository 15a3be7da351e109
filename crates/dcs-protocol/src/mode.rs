use serde::{Deserialize, Serialize};

/// Connection mode, negotiated once at handshake and immutable for the
/// connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Mode {
    Command,
    Intercept,
    Subscribe,
    PluginService,
    PluginHttpEndpoint,
}

/// Enumerated capability bits presented at handshake and checked per-command
/// by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Permission {
    CommandExecution,
    ObjectModelRead,
    ObjectModelReadWrite,
    FileSystemAccess,
    ReadGCodes,
    ManageUserSessions,
    RegisterHttpEndpoints,
    ManagePlugins,
}

/// Named channel a code is routed on. `Http`/`Sbc` carry explicit renames
/// since the wire uses the acronym casing from `spec.md`'s glossary
/// (`HTTP`, `SBC`) rather than the blanket `PascalCase` the other variants
/// happen to already satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CodeChannel {
    #[serde(rename = "HTTP")]
    Http,
    Telnet,
    File,
    Trigger,
    #[serde(rename = "SBC")]
    Sbc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_and_sbc_serialize_as_the_spec_glossary_acronyms() {
        assert_eq!(serde_json::to_value(CodeChannel::Http).unwrap(), "HTTP");
        assert_eq!(serde_json::to_value(CodeChannel::Sbc).unwrap(), "SBC");
        assert_eq!(serde_json::to_value(CodeChannel::Telnet).unwrap(), "Telnet");
    }

    #[test]
    fn http_and_sbc_deserialize_from_the_spec_glossary_acronyms() {
        let channel: CodeChannel = serde_json::from_value(serde_json::json!("HTTP")).unwrap();
        assert_eq!(channel, CodeChannel::Http);
        let channel: CodeChannel = serde_json::from_value(serde_json::json!("SBC")).unwrap();
        assert_eq!(channel, CodeChannel::Sbc);
    }
}

/// Stage at which an intercepting connection may observe a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum InterceptStage {
    PreCode,
    PostCode,
    ExecutedCode,
}

/// Subscribe-mode push strategy: a full object-model snapshot or just the
/// merge-patch since the last push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SubscribeMode {
    Full,
    Patch,
}
