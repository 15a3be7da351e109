use serde::{Deserialize, Serialize};

/// Client-to-server control frame on a Subscribe-mode connection. The
/// only frame a subscriber ever sends is an acknowledgement of the
/// previously pushed frame; disconnect is the only cancellation mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum SubscribeClientMessage {
    Acknowledge,
}
