//! In-memory reference implementation of [`DiscoveryEngine`].

use crate::engine::{DiscoveryEngine, FindServiceCallback};
use crate::error::{EngineError, Result};
use crate::store::ServiceStore;
use slpd_core::config::EngineConfig;
use slpd_core::{ExportMap, ScopeSet, UrlEntry};
use slpd_io::{ReactorHandle, TimeoutId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Export variable holding the number of stored entries.
pub const STORE_ENTRIES_VAR: &str = "slp-store-entries";

/// Export variable counting FindService lookups.
pub const FIND_REQUESTS_VAR: &str = "slp-find-requests";

/// Registry answering lookups from memory and expiring registrations on a
/// reactor timer.
pub struct SlpServer {
    config: EngineConfig,
    reactor: ReactorHandle,
    export_map: ExportMap,
    store: Rc<RefCell<ServiceStore>>,
    expiry_timer: Cell<Option<TimeoutId>>,
}

impl SlpServer {
    /// Creates a server; nothing runs until [`DiscoveryEngine::init`].
    pub fn new(config: EngineConfig, reactor: ReactorHandle, export_map: ExportMap) -> Self {
        Self {
            config,
            reactor,
            export_map,
            store: Rc::new(RefCell::new(ServiceStore::new())),
            expiry_timer: Cell::new(None),
        }
    }

    /// Returns the scopes this server accepts registrations for.
    pub fn scopes(&self) -> &ScopeSet {
        &self.config.scopes
    }

    fn publish_size(&self) {
        self.export_map
            .set_int(STORE_ENTRIES_VAR, self.store.borrow().len() as i64);
    }

    fn check_scopes(&self, scopes: &ScopeSet) -> Result<()> {
        if scopes.is_empty() {
            return Err(EngineError::NoScopes);
        }
        match scopes.iter().find(|scope| !self.config.scopes.contains(scope)) {
            Some(scope) => Err(EngineError::ScopeNotSupported {
                scope: scope.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl DiscoveryEngine for SlpServer {
    fn init(&self) -> Result<()> {
        if self.expiry_timer.get().is_some() {
            return Err(EngineError::AlreadyInitialized);
        }
        if self.config.scopes.is_empty() {
            return Err(EngineError::InvalidConfig(
                "at least one scope must be configured".to_string(),
            ));
        }
        if self.config.scopes.iter().any(str::is_empty) {
            return Err(EngineError::InvalidConfig(
                "scope names cannot be empty".to_string(),
            ));
        }
        if self.config.expiry_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "expiry interval cannot be 0".to_string(),
            ));
        }

        let store = Rc::downgrade(&self.store);
        let export_map = self.export_map.clone();
        let clock = self.reactor.clock();
        let timer = self
            .reactor
            .register_repeating_timeout(self.config.expiry_interval(), move || {
                let Some(store) = store.upgrade() else {
                    return false;
                };
                let mut store = store.borrow_mut();
                let expired = store.expire(clock.now());
                if expired > 0 {
                    debug!(expired, remaining = store.len(), "Expired registrations");
                    export_map.set_int(STORE_ENTRIES_VAR, store.len() as i64);
                }
                true
            });
        self.expiry_timer.set(Some(timer));
        self.publish_size();

        info!(
            scopes = %self.config.scopes,
            expiry_interval_secs = self.config.expiry_interval_secs,
            "SLP server initialized"
        );
        Ok(())
    }

    fn find_service(&self, scopes: &ScopeSet, service_type: &str, callback: FindServiceCallback) {
        let found = self.store.borrow().lookup(scopes, service_type);
        self.export_map.add_int(FIND_REQUESTS_VAR, 1);
        debug!(
            scopes = %scopes,
            service_type,
            matches = found.len(),
            "FindService lookup"
        );

        self.reactor.execute(move || callback(found));
    }

    fn register_service(
        &self,
        scopes: &ScopeSet,
        service_type: &str,
        entry: UrlEntry,
    ) -> Result<()> {
        self.check_scopes(scopes)?;

        let url = entry.url();
        if service_type.trim().is_empty() {
            return Err(EngineError::invalid_registration(url, "service type is empty"));
        }
        if url.is_empty() {
            return Err(EngineError::invalid_registration(url, "url is empty"));
        }
        if !url_has_type(url, service_type) {
            return Err(EngineError::invalid_registration(
                url,
                format!("url does not match service type '{}'", service_type),
            ));
        }
        if entry.lifetime() == 0 {
            return Err(EngineError::invalid_registration(url, "lifetime is 0"));
        }

        let now = self.reactor.clock().now();
        let mut store = self.store.borrow_mut();
        for scope in scopes.iter() {
            let added = store.insert(scope, service_type, entry.clone(), now);
            debug!(scope, service_type, url = entry.url(), added, "Registered service");
        }
        drop(store);

        self.publish_size();
        Ok(())
    }

    fn deregister_service(&self, scopes: &ScopeSet, url: &str) -> Result<()> {
        self.check_scopes(scopes)?;

        let mut removed = false;
        {
            let mut store = self.store.borrow_mut();
            for scope in scopes.iter() {
                removed |= store.remove(scope, url);
            }
        }

        if !removed {
            return Err(EngineError::NotRegistered {
                url: url.to_string(),
            });
        }

        debug!(scopes = %scopes, url, "Deregistered service");
        self.publish_size();
        Ok(())
    }

    fn bulk_load(&self, scope: &str, service_type: &str, entries: &[UrlEntry]) {
        let now = self.reactor.clock().now();
        {
            let mut store = self.store.borrow_mut();
            for entry in entries {
                store.insert(scope, service_type, entry.clone(), now);
            }
        }

        if !self.config.scopes.contains(scope) {
            warn!(scope, "Bulk loaded into a scope this daemon does not serve");
        }
        info!(scope, service_type, count = entries.len(), "Bulk loaded entries");
        self.publish_size();
    }

    fn dump_store(&self) {
        let store = self.store.borrow();
        info!(entries = store.len(), "Service store dump");
        for (scope, service_type, stored) in store.iter() {
            info!(
                scope,
                service_type,
                url = stored.entry.url(),
                lifetime = stored.entry.lifetime(),
                "Stored entry"
            );
        }
    }

    fn entry_count(&self) -> usize {
        self.store.borrow().len()
    }
}

impl Drop for SlpServer {
    fn drop(&mut self) {
        if let Some(timer) = self.expiry_timer.take() {
            self.reactor.remove_timeout(timer);
        }
    }
}

/// True if `url` starts with `service_type` followed by `:` (which
/// includes `://`).
fn url_has_type(url: &str, service_type: &str) -> bool {
    url.to_lowercase()
        .strip_prefix(&service_type.trim().to_lowercase())
        .is_some_and(|rest| rest.starts_with(':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slpd_io::Reactor;
    use std::time::Duration;

    const PRINTER: &str = "service:printer";

    fn scopes(names: &[&str]) -> ScopeSet {
        names.iter().collect()
    }

    fn server(reactor: &Reactor) -> SlpServer {
        let config = EngineConfig {
            scopes: scopes(&["default", "lab"]),
            expiry_interval_secs: 1,
        };
        SlpServer::new(config, reactor.handle(), ExportMap::new())
    }

    fn run_for(reactor: &Reactor, duration: Duration) {
        let handle = reactor.handle();
        {
            let _context = reactor.enter();
            let stopper = handle.clone();
            handle.register_timeout(duration, move || stopper.terminate());
        }
        reactor.run();
    }

    #[test]
    fn test_init_rejects_second_call() {
        let reactor = Reactor::new().unwrap();
        let _context = reactor.enter();
        let server = server(&reactor);
        server.init().unwrap();
        assert!(matches!(server.init(), Err(EngineError::AlreadyInitialized)));
    }

    #[test]
    fn test_init_rejects_empty_scopes() {
        let reactor = Reactor::new().unwrap();
        let _context = reactor.enter();
        let config = EngineConfig {
            scopes: ScopeSet::new(),
            expiry_interval_secs: 1,
        };
        let server = SlpServer::new(config, reactor.handle(), ExportMap::new());
        assert!(matches!(server.init(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_find_completes_on_later_turn() {
        let reactor = Reactor::new().unwrap();
        let server = server(&reactor);
        let results = Rc::new(RefCell::new(Vec::new()));
        {
            let _context = reactor.enter();
            server.init().unwrap();
            server.bulk_load(
                "default",
                PRINTER,
                &[UrlEntry::new("service:printer://10.0.0.5", 600)],
            );

            let sink = results.clone();
            server.find_service(
                &scopes(&["default"]),
                PRINTER,
                Box::new(move |entries| sink.borrow_mut().push(entries)),
            );
            assert!(results.borrow().is_empty());
        }
        run_for(&reactor, Duration::from_millis(20));

        let results = results.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0],
            vec![UrlEntry::new("service:printer://10.0.0.5", 600)]
        );
    }

    #[test]
    fn test_find_without_matches_completes_once() {
        let reactor = Reactor::new().unwrap();
        let server = server(&reactor);
        let calls = Rc::new(RefCell::new(Vec::new()));
        {
            let _context = reactor.enter();
            server.init().unwrap();
            let sink = calls.clone();
            server.find_service(
                &ScopeSet::new(),
                PRINTER,
                Box::new(move |entries| sink.borrow_mut().push(entries.len())),
            );
        }
        run_for(&reactor, Duration::from_millis(20));
        assert_eq!(*calls.borrow(), vec![0]);
    }

    #[test]
    fn test_register_validation() {
        let reactor = Reactor::new().unwrap();
        let _context = reactor.enter();
        let server = server(&reactor);
        server.init().unwrap();
        let entry = || UrlEntry::new("service:printer://10.0.0.5", 600);

        let err = server
            .register_service(&ScopeSet::new(), PRINTER, entry())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoScopes));

        let err = server
            .register_service(&scopes(&["default", "remote"]), PRINTER, entry())
            .unwrap_err();
        assert!(matches!(err, EngineError::ScopeNotSupported { ref scope } if scope == "remote"));

        let err = server
            .register_service(&scopes(&["default"]), "service:scanner", entry())
            .unwrap_err();
        assert_eq!(err.code().as_u32(), 3);

        let err = server
            .register_service(
                &scopes(&["default"]),
                PRINTER,
                UrlEntry::new("service:printer://10.0.0.5", 0),
            )
            .unwrap_err();
        assert_eq!(err.code().as_u32(), 3);

        let err = server
            .register_service(
                &scopes(&["default"]),
                PRINTER,
                UrlEntry::new("service:printerx://10.0.0.5", 600),
            )
            .unwrap_err();
        assert_eq!(err.code().as_u32(), 3);

        assert_eq!(server.entry_count(), 0);
    }

    #[test]
    fn test_url_must_continue_type_with_separator() {
        assert!(url_has_type("service:printer://10.0.0.5", PRINTER));
        assert!(url_has_type("SERVICE:Printer://10.0.0.5", PRINTER));
        assert!(url_has_type("service:printer:lpr://10.0.0.5", PRINTER));
        assert!(!url_has_type("service:printerx://10.0.0.5", PRINTER));
        assert!(!url_has_type("service:printer", PRINTER));
        assert!(!url_has_type("service:scanner://10.0.0.5", PRINTER));
    }

    #[test]
    fn test_register_then_deregister() {
        let reactor = Reactor::new().unwrap();
        let _context = reactor.enter();
        let export_map = ExportMap::new();
        let config = EngineConfig {
            scopes: scopes(&["default", "lab"]),
            expiry_interval_secs: 1,
        };
        let server = SlpServer::new(config, reactor.handle(), export_map.clone());
        server.init().unwrap();

        server
            .register_service(
                &scopes(&["Default", "lab"]),
                "SERVICE:PRINTER",
                UrlEntry::new("service:printer://10.0.0.5", 600),
            )
            .unwrap();
        assert_eq!(server.entry_count(), 2);
        assert_eq!(export_map.get_int(STORE_ENTRIES_VAR), Some(2));

        server
            .deregister_service(&scopes(&["default", "lab"]), "service:printer://10.0.0.5")
            .unwrap();
        assert_eq!(server.entry_count(), 0);

        let err = server
            .deregister_service(&scopes(&["default"]), "service:printer://10.0.0.5")
            .unwrap_err();
        assert!(matches!(err, EngineError::NotRegistered { .. }));
    }

    #[test]
    fn test_expiry_timer_purges_registrations() {
        let reactor = Reactor::new().unwrap();
        let server = server(&reactor);
        {
            let _context = reactor.enter();
            server.init().unwrap();
            server
                .register_service(
                    &scopes(&["default"]),
                    PRINTER,
                    UrlEntry::new("service:printer://10.0.0.5", 1),
                )
                .unwrap();
        }
        assert_eq!(server.entry_count(), 1);

        run_for(&reactor, Duration::from_millis(2100));
        assert_eq!(server.entry_count(), 0);
    }
}
