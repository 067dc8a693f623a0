//! Error types for the daemon

use slpd_engine::EngineError;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors raised by the connection acceptor
#[derive(Debug, Error)]
pub enum AcceptorError {
    /// The control port could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `listen` was called on an acceptor that is already listening
    #[error("Acceptor is already listening on {0}")]
    AlreadyListening(SocketAddr),

    /// `start` was called before `listen`
    #[error("Acceptor is not listening")]
    NotListening,
}

/// Errors that abort daemon startup
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Discovery engine initialization failed
    #[error("Engine initialization failed: {0}")]
    Engine(#[from] EngineError),

    /// The control listener could not be started
    #[error("RPC listener failed: {0}")]
    Acceptor(#[from] AcceptorError),

    /// The diagnostics endpoint could not be bound
    #[error("HTTP diagnostics failed on {address}: {source}")]
    Http {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The reactor runtime could not be created
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}
