use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mode::{CodeChannel, Mode, Permission};

/// Every request kind the dispatcher knows about. The `command` field is
/// the wire discriminator; field names are bit-exact with each kind's
/// parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    // --- Codes ---
    Code { channel: CodeChannel, code: String },
    SimpleCode { channel: CodeChannel, code: String },
    Flush { channel: CodeChannel },
    EvaluateExpression { channel: CodeChannel, expression: String },

    // --- Model ---
    GetObjectModel,
    LockObjectModel,
    UnlockObjectModel,
    PatchObjectModel { key: String, patch: Value },
    SetObjectModel { key: String, value: Value },
    SyncObjectModel,

    // --- Files ---
    GetFileInfo { path: String },
    ResolvePath { path: String },

    // --- Sessions ---
    AddUserSession { access_level: String, origin: String },
    RemoveUserSession { session_id: u32 },

    // --- Endpoints ---
    AddHttpEndpoint { http_method: String, namespace: String, path: String, is_upload: bool },
    RemoveHttpEndpoint { http_method: String, namespace: String, path: String },

    // --- Plugins ---
    InstallPlugin { plugin_file: String },
    StartPlugin { plugin: String },
    StopPlugin { plugin: String },
    UninstallPlugin { plugin: String },
    SetPluginData { plugin: String, key: String, value: Value },

    // --- Misc ---
    WriteMessage { message: String },
    SetUpdateStatus { updating: bool },
}

/// Static metadata the dispatcher consults as its sole authority on
/// permissions, locking, and mode eligibility. No other module reads a
/// connection's permission set directly.
pub struct CommandMeta {
    pub name: &'static str,
    pub required_permissions: &'static [Permission],
    pub lock_implicit: bool,
    pub allowed_modes: &'static [Mode],
}

impl Command {
    /// Every wire `command` tag value this enum recognizes, for
    /// distinguishing an unrecognized command name from a malformed frame
    /// at decode time.
    pub const KNOWN_NAMES: &'static [&'static str] = &[
        "Code",
        "SimpleCode",
        "Flush",
        "EvaluateExpression",
        "GetObjectModel",
        "LockObjectModel",
        "UnlockObjectModel",
        "PatchObjectModel",
        "SetObjectModel",
        "SyncObjectModel",
        "GetFileInfo",
        "ResolvePath",
        "AddUserSession",
        "RemoveUserSession",
        "AddHttpEndpoint",
        "RemoveHttpEndpoint",
        "InstallPlugin",
        "StartPlugin",
        "StopPlugin",
        "UninstallPlugin",
        "SetPluginData",
        "WriteMessage",
        "SetUpdateStatus",
    ];

    pub fn is_known_name(name: &str) -> bool {
        Self::KNOWN_NAMES.contains(&name)
    }

    pub fn name(&self) -> &'static str {
        self.meta().name
    }

    pub fn meta(&self) -> CommandMeta {
        use Mode::{Command as CommandMode, Intercept, PluginHttpEndpoint};
        use Permission::*;

        match self {
            Command::Code { .. } | Command::SimpleCode { .. } => CommandMeta {
                name: "Code",
                required_permissions: &[CommandExecution],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::Flush { .. } => CommandMeta {
                name: "Flush",
                required_permissions: &[CommandExecution],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::EvaluateExpression { .. } => CommandMeta {
                name: "EvaluateExpression",
                required_permissions: &[ObjectModelRead],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::GetObjectModel => CommandMeta {
                name: "GetObjectModel",
                required_permissions: &[ObjectModelRead],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::LockObjectModel => CommandMeta {
                name: "LockObjectModel",
                required_permissions: &[ObjectModelReadWrite],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::UnlockObjectModel => CommandMeta {
                name: "UnlockObjectModel",
                required_permissions: &[ObjectModelReadWrite],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::PatchObjectModel { .. } | Command::SetObjectModel { .. } => CommandMeta {
                name: "PatchObjectModel",
                required_permissions: &[ObjectModelReadWrite],
                lock_implicit: true,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::SyncObjectModel => CommandMeta {
                name: "SyncObjectModel",
                required_permissions: &[ObjectModelRead],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::GetFileInfo { .. } | Command::ResolvePath { .. } => CommandMeta {
                name: "GetFileInfo",
                required_permissions: &[FileSystemAccess],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::AddUserSession { .. } | Command::RemoveUserSession { .. } => CommandMeta {
                name: "AddUserSession",
                required_permissions: &[ManageUserSessions],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::AddHttpEndpoint { .. } => CommandMeta {
                name: "AddHttpEndpoint",
                required_permissions: &[RegisterHttpEndpoints],
                lock_implicit: false,
                allowed_modes: &[PluginHttpEndpoint],
            },
            // Unlike `AddHttpEndpoint` (only ever the first frame of a
            // PluginHttpEndpoint handshake), `RemoveHttpEndpoint` is an
            // administrative action issued from an ordinary Command
            // connection to tear down another plugin's registration.
            Command::RemoveHttpEndpoint { .. } => CommandMeta {
                name: "RemoveHttpEndpoint",
                required_permissions: &[RegisterHttpEndpoints],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::InstallPlugin { .. }
            | Command::StartPlugin { .. }
            | Command::StopPlugin { .. }
            | Command::UninstallPlugin { .. }
            | Command::SetPluginData { .. } => CommandMeta {
                name: "ManagePlugins",
                required_permissions: &[ManagePlugins],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
            Command::WriteMessage { .. } | Command::SetUpdateStatus { .. } => CommandMeta {
                name: "WriteMessage",
                required_permissions: &[CommandExecution],
                lock_implicit: false,
                allowed_modes: &[CommandMode, Intercept],
            },
        }
    }
}
