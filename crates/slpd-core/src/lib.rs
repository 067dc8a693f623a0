//! # slpd core
//!
//! Shared types, error codes, configuration and the export map used by every
//! crate of the Service Location daemon.
//!
//! - **Types**: `UrlEntry`, `ScopeSet` and `ConnectionId`.
//! - **Errors**: the SLP `ErrorCode` table (RFC 2608) and configuration errors.
//! - **Configuration**: `DaemonConfig`, loaded from YAML with optional
//!   `SLPD__*` environment overrides.
//! - **Export map**: thread-safe diagnostic variables read by the HTTP
//!   diagnostics endpoint.
//!
//! ## Example
//!
//! ```
//! use slpd_core::types::{ScopeSet, UrlEntry};
//!
//! let scopes: ScopeSet = ["Default", "lab"].into_iter().collect();
//! assert!(scopes.contains("default"));
//!
//! let entry = UrlEntry::new("service:printer://10.0.0.5", 600);
//! assert_eq!(entry.lifetime(), 600);
//! ```

pub mod config;
pub mod error;
pub mod export_map;
pub mod types;

pub use config::DaemonConfig;
pub use error::{ConfigError, ErrorCode, Result};
pub use export_map::{ExportMap, ExportValue};
pub use types::{ConnectionId, ScopeSet, UrlEntry};
