use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The tuple a PluginHttpEndpoint connection registers with the daemon's
/// endpoint registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpEndpointRegistration {
    pub http_method: String,
    pub namespace: String,
    pub path: String,
    pub is_upload: bool,
}

impl HttpEndpointRegistration {
    /// Reserved namespace prefixes the registry refuses to hand out.
    const RESERVED_NAMESPACES: &'static [&'static str] = &["machine", "sbc", "dsf"];

    pub fn has_reserved_namespace(&self) -> bool {
        Self::RESERVED_NAMESPACES.contains(&self.namespace.as_str())
    }

    /// Whether `self` and `other` name the same `{method, namespace, path}`
    /// tuple, ignoring `is_upload` — `RemoveHttpEndpoint` doesn't carry that
    /// field, since it only needs to name the registration, not redescribe it.
    pub fn same_tuple_as(&self, other: &Self) -> bool {
        self.http_method == other.http_method && self.namespace == other.namespace && self.path == other.path
    }
}

/// Request-description frame the external HTTP front-end writes to a
/// dedicated endpoint socket before optionally streaming the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestFrame {
    pub http_method: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body_length: u64,
}

/// Response-description frame the daemon writes back, optionally followed
/// by a response body of `body_length` bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponseFrame {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body_length: u64,
}
