//! Error types for the discovery engine

use slpd_core::ErrorCode;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by a discovery engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine configuration is unusable
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// `init` was called twice
    #[error("Engine is already initialized")]
    AlreadyInitialized,

    /// A requested scope is not served by this daemon
    #[error("Scope '{scope}' is not supported")]
    ScopeNotSupported { scope: String },

    /// The request named no scopes
    #[error("Request names no scopes")]
    NoScopes,

    /// Registration failed validation
    #[error("Invalid registration for '{url}': {reason}")]
    InvalidRegistration { url: String, reason: String },

    /// Deregistration of a URL that is not registered
    #[error("'{url}' is not registered")]
    NotRegistered { url: String },
}

impl EngineError {
    /// Maps the error onto the SLP error code returned to RPC callers.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NoScopes | EngineError::ScopeNotSupported { .. } => {
                ErrorCode::ScopeNotSupported
            }
            EngineError::InvalidRegistration { .. } | EngineError::NotRegistered { .. } => {
                ErrorCode::InvalidRegistration
            }
            EngineError::InvalidConfig(_) | EngineError::AlreadyInitialized => {
                ErrorCode::InternalError
            }
        }
    }

    pub(crate) fn invalid_registration(url: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidRegistration {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::NoScopes.code().as_u32(), 4);
        assert_eq!(
            EngineError::ScopeNotSupported {
                scope: "lab".to_string()
            }
            .code(),
            ErrorCode::ScopeNotSupported
        );
        assert_eq!(
            EngineError::invalid_registration("service:x://a", "lifetime is 0")
                .code()
                .as_u32(),
            3
        );
        assert_eq!(
            EngineError::NotRegistered {
                url: "service:x://a".to_string()
            }
            .code(),
            ErrorCode::InvalidRegistration
        );
        assert_eq!(EngineError::AlreadyInitialized.code().as_u32(), 10);
    }
}
