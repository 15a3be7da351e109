use serde::{Deserialize, Serialize};

/// Wire-level error kinds. Each variant names the exact string carried in
/// a response's `errorType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorType {
    #[error("protocol error")]
    ProtocolError,
    #[error("deserialization error")]
    DeserializationError,
    #[error("unknown command")]
    UnknownCommand,
    #[error("wrong mode")]
    WrongMode,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("lock already held")]
    AlreadyHeld,
    #[error("lock not held")]
    NotHeld,
    #[error("cancelled")]
    Cancelled,
    #[error("io error")]
    IoError,
}

impl ErrorType {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            ErrorType::ProtocolError => "ProtocolError",
            ErrorType::DeserializationError => "DeserializationError",
            ErrorType::UnknownCommand => "UnknownCommand",
            ErrorType::WrongMode => "WrongMode",
            ErrorType::PermissionDenied => "PermissionDenied",
            ErrorType::InvalidArgument => "InvalidArgument",
            ErrorType::NotFound => "NotFound",
            ErrorType::AlreadyExists => "AlreadyExists",
            ErrorType::AlreadyHeld => "AlreadyHeld",
            ErrorType::NotHeld => "NotHeld",
            ErrorType::Cancelled => "Cancelled",
            ErrorType::IoError => "IoError",
        }
    }

    /// Whether an error of this kind is fatal to the connection, i.e.
    /// must be followed by closing the socket rather than just failing
    /// the one in-flight command.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorType::ProtocolError | ErrorType::IoError)
    }
}
