//! Error codes for structured error handling in the Decoy Den protocol.
//!
//! These codes are wire-compatible with the game server's `ErrorCode` enum
//! and serialize using `SCREAMING_SNAKE_CASE` to match the server's JSON
//! format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes returned by the Decoy Den server.
///
/// Each variant corresponds to a specific error condition. The server sends
/// these as `"SCREAMING_SNAKE_CASE"` strings (e.g., `"ROOM_NOT_FOUND"`).
///
/// Use [`description()`](ErrorCode::description) for a human-readable
/// explanation and [`is_retryable()`](ErrorCode::is_retryable) to decide
/// whether repeating the failed action can succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Network / transport errors
    NetworkError,
    ConnectionTimeout,
    ConnectionRefused,

    // Permission errors
    Unauthorized,
    Forbidden,
    PermissionDenied,

    // Validation errors
    ValidationError,
    InvalidInput,
    InvalidState,

    // Resource errors
    NotFound,
    RoomNotFound,
    UserNotFound,

    // Server errors
    InternalServerError,
    ServiceUnavailable,

    // Everything else
    UnknownError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    ///
    /// These are the user-facing messages a frontend can display verbatim.
    pub fn description(&self) -> &'static str {
        match self {
            // Network / transport errors
            Self::NetworkError => {
                "Network connection error. Please check your internet connection."
            }
            Self::ConnectionTimeout => "Connection timed out. Please try again.",
            Self::ConnectionRefused => "Connection refused. The server may be down.",

            // Permission errors
            Self::Unauthorized => "You are not authenticated. Please rejoin the room.",
            Self::Forbidden => "You do not have permission to perform this action.",
            Self::PermissionDenied => {
                "Permission denied. Only the host or leader can perform this action."
            }

            // Validation errors
            Self::ValidationError => {
                "Invalid input. Please check your topic and emoji selection."
            }
            Self::InvalidInput => "Invalid input format.",
            Self::InvalidState => "Invalid game state. Please refresh the room.",

            // Resource errors
            Self::NotFound => "Resource not found.",
            Self::RoomNotFound => "Room not found. It may have been closed.",
            Self::UserNotFound => "User not found.",

            // Server errors
            Self::InternalServerError => "Server error occurred. Please try again later.",
            Self::ServiceUnavailable => {
                "Service is temporarily unavailable. Please try again later."
            }

            Self::UnknownError => "An unknown error occurred. Please try again.",
        }
    }

    /// Whether the failed action can meaningfully be retried.
    ///
    /// Network, timeout, and availability failures are transient; permission,
    /// validation, and not-found failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::ConnectionTimeout | Self::ServiceUnavailable
        )
    }

    /// Whether the error indicates the session itself is broken and a plain
    /// retry is unlikely to help (the room should be refreshed or left).
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::InternalServerError | Self::InvalidState)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::RoomNotFound).unwrap();
        assert_eq!(json, "\"ROOM_NOT_FOUND\"");
        let json = serde_json::to_string(&ErrorCode::PermissionDenied).unwrap();
        assert_eq!(json, "\"PERMISSION_DENIED\"");
    }

    #[test]
    fn deserializes_from_wire_form() {
        let code: ErrorCode = serde_json::from_str("\"CONNECTION_TIMEOUT\"").unwrap();
        assert_eq!(code, ErrorCode::ConnectionTimeout);
    }

    #[test]
    fn retryable_classification() {
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(ErrorCode::ConnectionTimeout.is_retryable());
        assert!(ErrorCode::ServiceUnavailable.is_retryable());
        assert!(!ErrorCode::PermissionDenied.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
        assert!(!ErrorCode::RoomNotFound.is_retryable());
    }

    #[test]
    fn critical_classification() {
        assert!(ErrorCode::InternalServerError.is_critical());
        assert!(ErrorCode::InvalidState.is_critical());
        assert!(!ErrorCode::NetworkError.is_critical());
    }
}
