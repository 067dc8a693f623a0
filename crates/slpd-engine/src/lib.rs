//! # slpd-engine
//!
//! The discovery engine contract consumed by the daemon, and [`SlpServer`],
//! an in-memory registry implementing it.
//!
//! The engine runs on the reactor thread: lookups complete through a boxed
//! `FnOnce` continuation queued on the reactor, never synchronously.

pub mod engine;
pub mod error;
pub mod server;
pub mod store;

pub use engine::{DiscoveryEngine, FindServiceCallback};
pub use error::{EngineError, Result};
pub use server::SlpServer;
pub use store::{ServiceStore, StoredEntry};
