//! Contract between the daemon and a discovery engine.

use crate::error::Result;
use slpd_core::{ScopeSet, UrlEntry};

/// Continuation handed to [`DiscoveryEngine::find_service`].
///
/// Being `FnOnce`, an engine cannot invoke it more than once.
pub type FindServiceCallback = Box<dyn FnOnce(Vec<UrlEntry>)>;

/// A service registry the daemon routes RPC calls into.
///
/// All methods are called on the reactor thread and must not block.
pub trait DiscoveryEngine {
    /// Prepares the engine. The daemon aborts startup if this fails.
    fn init(&self) -> Result<()>;

    /// Looks up URL entries of `service_type` in `scopes`.
    ///
    /// The result is delivered through `callback`, which the engine invokes
    /// exactly once and never before this call returns.
    fn find_service(&self, scopes: &ScopeSet, service_type: &str, callback: FindServiceCallback);

    /// Registers (or refreshes) `entry` as a `service_type` in `scopes`.
    fn register_service(&self, scopes: &ScopeSet, service_type: &str, entry: UrlEntry)
        -> Result<()>;

    /// Removes `url` from `scopes`.
    fn deregister_service(&self, scopes: &ScopeSet, url: &str) -> Result<()>;

    /// Seeds the registry without validation.
    fn bulk_load(&self, scope: &str, service_type: &str, entries: &[UrlEntry]);

    /// Writes the registry contents to the log.
    fn dump_store(&self);

    /// Number of stored entries.
    fn entry_count(&self) -> usize;
}
