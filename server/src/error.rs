use dcs_protocol::{ErrorType, Permission};

/// Everything that can go wrong while servicing one connection, mapped onto
/// the wire's `errorType` strings. Handlers return this; the connection
/// loop is the only place that turns it into a response or a close.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} is not valid in this connection's mode")]
    WrongMode { command: &'static str },

    #[error("{command} requires {required:?}")]
    PermissionDenied { command: &'static str, required: Permission },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("object-model lock already held by this connection")]
    AlreadyHeld,

    #[error("object-model lock is not held by this connection")]
    NotHeld,

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// The wire `errorType` string this error reports as.
    pub fn error_type(&self) -> ErrorType {
        match self {
            DispatchError::Protocol(_) => ErrorType::ProtocolError,
            DispatchError::Deserialization(_) => ErrorType::DeserializationError,
            DispatchError::UnknownCommand(_) => ErrorType::UnknownCommand,
            DispatchError::WrongMode { .. } => ErrorType::WrongMode,
            DispatchError::PermissionDenied { .. } => ErrorType::PermissionDenied,
            DispatchError::InvalidArgument(_) => ErrorType::InvalidArgument,
            DispatchError::NotFound(_) => ErrorType::NotFound,
            DispatchError::AlreadyExists(_) => ErrorType::AlreadyExists,
            DispatchError::AlreadyHeld => ErrorType::AlreadyHeld,
            DispatchError::NotHeld => ErrorType::NotHeld,
            DispatchError::Cancelled => ErrorType::Cancelled,
            DispatchError::Io(_) => ErrorType::IoError,
        }
    }

    /// Whether this error is fatal to the connection (the socket should be
    /// closed after a best-effort error frame) rather than just reported as
    /// one failed command.
    pub fn is_fatal(&self) -> bool {
        self.error_type().is_fatal()
    }
}
