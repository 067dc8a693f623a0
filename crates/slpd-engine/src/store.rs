//! Registry storage: scope → service type → registered URL entries.

use slpd_core::{ScopeSet, UrlEntry};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

/// A URL entry together with the time it was (re-)registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub entry: UrlEntry,
    pub registered_at: Instant,
}

impl StoredEntry {
    /// Returns true once the entry's lifetime has elapsed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.registered_at)
            >= Duration::from_secs(u64::from(self.entry.lifetime()))
    }
}

/// In-memory service registry.
///
/// Scope names and service types are keyed case-insensitively; within one
/// service type entries keep registration order.
#[derive(Debug, Default)]
pub struct ServiceStore {
    scopes: BTreeMap<String, BTreeMap<String, Vec<StoredEntry>>>,
}

impl ServiceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entry`, replacing an existing entry with the same URL.
    ///
    /// Returns true if the URL was not stored before.
    pub fn insert(&mut self, scope: &str, service_type: &str, entry: UrlEntry, now: Instant) -> bool {
        let entries = self
            .scopes
            .entry(ScopeSet::canonicalize(scope))
            .or_default()
            .entry(type_key(service_type))
            .or_default();

        let stored = StoredEntry {
            entry,
            registered_at: now,
        };
        match entries
            .iter_mut()
            .find(|existing| existing.entry.url() == stored.entry.url())
        {
            Some(existing) => {
                *existing = stored;
                false
            }
            None => {
                entries.push(stored);
                true
            }
        }
    }

    /// Removes `url` from `scope`. Returns true if it was present.
    pub fn remove(&mut self, scope: &str, url: &str) -> bool {
        let Some(types) = self.scopes.get_mut(&ScopeSet::canonicalize(scope)) else {
            return false;
        };

        let mut removed = false;
        for entries in types.values_mut() {
            let before = entries.len();
            entries.retain(|stored| stored.entry.url() != url);
            removed |= entries.len() != before;
        }

        self.prune();
        removed
    }

    /// Collects the entries of `service_type` across `scopes`.
    ///
    /// Scopes are visited in sorted order and a URL stored in several of
    /// them is reported once.
    pub fn lookup(&self, scopes: &ScopeSet, service_type: &str) -> Vec<UrlEntry> {
        let key = type_key(service_type);
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for scope in scopes.iter() {
            let Some(entries) = self.scopes.get(scope).and_then(|types| types.get(&key)) else {
                continue;
            };
            for stored in entries {
                if seen.insert(stored.entry.url()) {
                    found.push(stored.entry.clone());
                }
            }
        }

        found
    }

    /// Drops every entry whose lifetime has elapsed. Returns how many were
    /// dropped.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        for types in self.scopes.values_mut() {
            for entries in types.values_mut() {
                let before = entries.len();
                entries.retain(|stored| !stored.is_expired(now));
                expired += before - entries.len();
            }
        }

        self.prune();
        expired
    }

    /// Number of stored entries, counting each scope separately.
    pub fn len(&self) -> usize {
        self.scopes
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Iterates over `(scope, service_type, entry)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &StoredEntry)> {
        self.scopes.iter().flat_map(|(scope, types)| {
            types.iter().flat_map(move |(service_type, entries)| {
                entries
                    .iter()
                    .map(move |stored| (scope.as_str(), service_type.as_str(), stored))
            })
        })
    }

    fn prune(&mut self) {
        for types in self.scopes.values_mut() {
            types.retain(|_, entries| !entries.is_empty());
        }
        self.scopes.retain(|_, types| !types.is_empty());
    }
}

fn type_key(service_type: &str) -> String {
    service_type.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRINTER: &str = "service:printer";

    fn scopes(names: &[&str]) -> ScopeSet {
        names.iter().collect()
    }

    #[test]
    fn test_lookup_matches_type_case_insensitively() {
        let now = Instant::now();
        let mut store = ServiceStore::new();
        store.insert("Default", "Service:Printer", UrlEntry::new("service:printer://10.0.0.5", 600), now);

        let found = store.lookup(&scopes(&["default"]), PRINTER);
        assert_eq!(found, vec![UrlEntry::new("service:printer://10.0.0.5", 600)]);
        assert!(store.lookup(&scopes(&["default"]), "service:scanner").is_empty());
        assert!(store.lookup(&scopes(&["lab"]), PRINTER).is_empty());
    }

    #[test]
    fn test_insert_refreshes_existing_url() {
        let now = Instant::now();
        let mut store = ServiceStore::new();
        assert!(store.insert("default", PRINTER, UrlEntry::new("service:printer://a", 60), now));
        assert!(!store.insert("default", PRINTER, UrlEntry::new("service:printer://a", 300), now));

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.lookup(&scopes(&["default"]), PRINTER)[0].lifetime(),
            300
        );
    }

    #[test]
    fn test_lookup_deduplicates_across_scopes() {
        let now = Instant::now();
        let mut store = ServiceStore::new();
        store.insert("lab", PRINTER, UrlEntry::new("service:printer://a", 60), now);
        store.insert("default", PRINTER, UrlEntry::new("service:printer://a", 60), now);
        store.insert("default", PRINTER, UrlEntry::new("service:printer://b", 60), now);

        let found = store.lookup(&scopes(&["default", "lab"]), PRINTER);
        let urls: Vec<_> = found.iter().map(UrlEntry::url).collect();
        assert_eq!(urls, vec!["service:printer://a", "service:printer://b"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_remove_prunes_empty_scopes() {
        let now = Instant::now();
        let mut store = ServiceStore::new();
        store.insert("default", PRINTER, UrlEntry::new("service:printer://a", 60), now);

        assert!(!store.remove("lab", "service:printer://a"));
        assert!(store.remove("default", "service:printer://a"));
        assert!(!store.remove("default", "service:printer://a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_expire_drops_elapsed_entries() {
        let start = Instant::now();
        let mut store = ServiceStore::new();
        store.insert("default", PRINTER, UrlEntry::new("service:printer://short", 10), start);
        store.insert("default", PRINTER, UrlEntry::new("service:printer://long", 600), start);

        assert_eq!(store.expire(start + Duration::from_secs(9)), 0);
        assert_eq!(store.expire(start + Duration::from_secs(10)), 1);

        let remaining: Vec<_> = store.iter().map(|(_, _, stored)| stored.entry.url()).collect();
        assert_eq!(remaining, vec!["service:printer://long"]);
    }
}
