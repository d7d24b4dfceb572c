//! Error types for the Decoy Den client.

use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Errors that can occur when using the Decoy Den client.
#[derive(Debug, Error)]
pub enum DecoyDenError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// The connection was closed with an abnormal close code.
    #[error("connection lost (close code {code})")]
    ConnectionLost {
        /// The close code reported by the transport (e.g. 1006).
        code: u16,
    },

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the
    /// client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a room operation before the session has a room.
    #[error("not in a room")]
    NotInRoom,

    /// The local participant is not allowed to perform the action.
    #[error("permission denied: {action}")]
    PermissionDenied {
        /// Description of the attempted privileged action.
        action: String,
    },

    /// The action is not valid in the current game phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Round-content validation failed (missing topic, wrong emoji count…).
    #[error("validation error: {0}")]
    Validation(String),

    /// The server returned an error message.
    #[error("server error: {message}")]
    Server {
        /// Human-readable error message from the server.
        message: String,
        /// Structured error code, if provided by the server.
        code: Option<ErrorCode>,
    },

    /// A local snapshot store operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecoyDenError {
    /// Whether the failed operation can meaningfully be retried.
    ///
    /// Mirrors [`ErrorCode::is_retryable`]: transport, timeout, and
    /// availability failures are transient; permission, validation, and
    /// not-found failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportSend(_)
            | Self::TransportReceive(_)
            | Self::TransportClosed
            | Self::ConnectionLost { .. }
            | Self::Timeout
            | Self::Io(_) => true,
            Self::Server { code, .. } => {
                code.as_ref().is_some_and(ErrorCode::is_retryable)
            }
            _ => false,
        }
    }

    /// The structured [`ErrorCode`] best describing this error, used when
    /// surfacing it to the UI alongside [`Session::last_error`].
    ///
    /// [`Session::last_error`]: crate::session::Session
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TransportSend(_) | Self::TransportReceive(_) | Self::Io(_) => {
                ErrorCode::NetworkError
            }
            Self::TransportClosed | Self::ConnectionLost { .. } | Self::NotConnected => {
                ErrorCode::ConnectionRefused
            }
            Self::Timeout => ErrorCode::ConnectionTimeout,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::Validation(_) | Self::Serialization(_) => ErrorCode::ValidationError,
            Self::NotInRoom => ErrorCode::RoomNotFound,
            Self::Server { code, .. } => {
                code.clone().unwrap_or(ErrorCode::InternalServerError)
            }
            Self::Storage(_) => ErrorCode::UnknownError,
        }
    }
}

/// A specialized [`Result`] type for Decoy Den client operations.
pub type Result<T> = std::result::Result<T, DecoyDenError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(DecoyDenError::TransportSend("broken pipe".into()).is_retryable());
        assert!(DecoyDenError::ConnectionLost { code: 1006 }.is_retryable());
        assert!(DecoyDenError::Timeout.is_retryable());
    }

    #[test]
    fn permission_and_validation_are_not_retryable() {
        let denied = DecoyDenError::PermissionDenied {
            action: "start game".into(),
        };
        assert!(!denied.is_retryable());
        assert!(!DecoyDenError::Validation("wrong emoji count".into()).is_retryable());
    }

    #[test]
    fn server_error_retryability_follows_code() {
        let transient = DecoyDenError::Server {
            message: "busy".into(),
            code: Some(ErrorCode::ServiceUnavailable),
        };
        assert!(transient.is_retryable());

        let terminal = DecoyDenError::Server {
            message: "gone".into(),
            code: Some(ErrorCode::RoomNotFound),
        };
        assert!(!terminal.is_retryable());

        let unclassified = DecoyDenError::Server {
            message: "???".into(),
            code: None,
        };
        assert!(!unclassified.is_retryable());
    }

    #[test]
    fn code_mapping() {
        assert_eq!(
            DecoyDenError::Timeout.code(),
            ErrorCode::ConnectionTimeout
        );
        assert_eq!(
            DecoyDenError::PermissionDenied {
                action: "skip".into()
            }
            .code(),
            ErrorCode::PermissionDenied
        );
    }
}
