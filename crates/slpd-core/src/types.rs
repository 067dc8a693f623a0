//! Core types shared by the daemon, the engine and the RPC layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// A discovered service endpoint and the number of seconds its registration
/// stays valid.
///
/// # Examples
///
/// ```
/// use slpd_core::types::UrlEntry;
///
/// let entry = UrlEntry::new("service:printer://10.0.0.5", 600);
/// assert_eq!(entry.url(), "service:printer://10.0.0.5");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UrlEntry {
    url: String,
    lifetime: u16,
}

impl UrlEntry {
    /// Creates a new URL entry.
    pub fn new(url: impl Into<String>, lifetime: u16) -> Self {
        Self {
            url: url.into(),
            lifetime,
        }
    }

    /// Returns the service URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the lifetime in seconds.
    pub fn lifetime(&self) -> u16 {
        self.lifetime
    }
}

impl fmt::Display for UrlEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}s)", self.url, self.lifetime)
    }
}

/// A set of scope names.
///
/// Scope names are case-insensitive, so they are stored lower-cased and
/// surrounding whitespace is dropped. Iteration order is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Creates an empty scope set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes a scope name the way the set stores it.
    pub fn canonicalize(scope: &str) -> String {
        scope.trim().to_lowercase()
    }

    /// Adds a scope, returning false if it was already present.
    pub fn insert(&mut self, scope: &str) -> bool {
        self.0.insert(Self::canonicalize(scope))
    }

    /// Returns true if the scope is a member of the set.
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(&Self::canonicalize(scope))
    }

    /// Returns the number of scopes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set holds no scopes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the scopes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ScopeSet::new();
        for scope in iter {
            set.insert(scope.as_ref());
        }
        set
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        scopes.iter().collect()
    }
}

impl From<ScopeSet> for Vec<String> {
    fn from(set: ScopeSet) -> Self {
        set.0.into_iter().collect()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        f.write_str(&joined)
    }
}

/// Unique identifier for an accepted control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new random connection identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
