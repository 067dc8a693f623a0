//! Error types shared across the daemon.
//!
//! `ErrorCode` is the only failure channel visible to RPC callers, so it
//! mirrors the SLP error table from RFC 2608 section 7.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// SLP error codes carried in `ServiceAck.error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    /// Request succeeded
    Ok = 0,
    /// No data in the requested language
    LanguageNotSupported = 1,
    /// Request could not be parsed
    ParseError = 2,
    /// Registration was rejected
    InvalidRegistration = 3,
    /// Scope is not served by this agent
    ScopeNotSupported = 4,
    /// Unsupported authentication block
    AuthenticationUnknown = 5,
    /// Authentication block missing
    AuthenticationAbsent = 6,
    /// Authentication failed
    AuthenticationFailed = 7,
    /// Unsupported protocol version
    VersionNotSupported = 9,
    /// Agent-side failure
    InternalError = 10,
    /// Directory agent is busy
    DaBusyNow = 11,
    /// Mandatory option not understood
    OptionNotUnderstood = 12,
    /// Update for an unknown registration
    InvalidUpdate = 13,
    /// Message type not supported
    MessageNotSupported = 14,
    /// Registration refreshed too often
    RefreshRejected = 15,
}

impl ErrorCode {
    /// Returns the numeric wire value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Parses a wire value, returning `None` for unassigned codes.
    pub fn from_u32(value: u32) -> Option<Self> {
        let code = match value {
            0 => ErrorCode::Ok,
            1 => ErrorCode::LanguageNotSupported,
            2 => ErrorCode::ParseError,
            3 => ErrorCode::InvalidRegistration,
            4 => ErrorCode::ScopeNotSupported,
            5 => ErrorCode::AuthenticationUnknown,
            6 => ErrorCode::AuthenticationAbsent,
            7 => ErrorCode::AuthenticationFailed,
            9 => ErrorCode::VersionNotSupported,
            10 => ErrorCode::InternalError,
            11 => ErrorCode::DaBusyNow,
            12 => ErrorCode::OptionNotUnderstood,
            13 => ErrorCode::InvalidUpdate,
            14 => ErrorCode::MessageNotSupported,
            15 => ErrorCode::RefreshRejected,
            _ => return None,
        };
        Some(code)
    }

    /// Returns true for `ErrorCode::Ok`.
    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Ok => "OK",
            ErrorCode::LanguageNotSupported => "LANGUAGE_NOT_SUPPORTED",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::InvalidRegistration => "INVALID_REGISTRATION",
            ErrorCode::ScopeNotSupported => "SCOPE_NOT_SUPPORTED",
            ErrorCode::AuthenticationUnknown => "AUTHENTICATION_UNKNOWN",
            ErrorCode::AuthenticationAbsent => "AUTHENTICATION_ABSENT",
            ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorCode::VersionNotSupported => "VER_NOT_SUPPORTED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DaBusyNow => "DA_BUSY_NOW",
            ErrorCode::OptionNotUnderstood => "OPTION_NOT_UNDERSTOOD",
            ErrorCode::InvalidUpdate => "INVALID_UPDATE",
            ErrorCode::MessageNotSupported => "MSG_NOT_SUPPORTED",
            ErrorCode::RefreshRejected => "REFRESH_REJECTED",
        };
        write!(f, "{} ({})", name, self.as_u32())
    }
}

/// Errors related to configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to load configuration file
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_values() {
        assert_eq!(ErrorCode::Ok.as_u32(), 0);
        assert_eq!(ErrorCode::InvalidRegistration.as_u32(), 3);
        assert_eq!(ErrorCode::from_u32(4), Some(ErrorCode::ScopeNotSupported));
    }

    #[test]
    fn test_unassigned_codes_are_rejected() {
        assert_eq!(ErrorCode::from_u32(8), None);
        assert_eq!(ErrorCode::from_u32(99), None);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ScopeNotSupported.to_string(), "SCOPE_NOT_SUPPORTED (4)");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid_value("rpc.port", "Port cannot be 0");
        assert_eq!(err.to_string(), "Invalid value for rpc.port: Port cannot be 0");
    }
}
