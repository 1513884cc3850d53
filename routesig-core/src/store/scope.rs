//! Scope resolution.
//!
//! Cells are grouped by scope, normally the location the host is showing.
//! When a call does not name a scope explicitly, the store asks its
//! [`ScopeResolver`]; when the resolver has nothing (no location, e.g. on a
//! server), the configured fallback scope is used.

use parking_lot::RwLock;

/// Supplies the scope of the current navigational context.
pub trait ScopeResolver: Send + Sync + 'static {
    /// The current scope, or `None` when there is no location context.
    fn current_scope(&self) -> Option<String>;
}

/// Resolver for hosts without a location; always defers to the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl ScopeResolver for NoLocation {
    fn current_scope(&self) -> Option<String> {
        None
    }
}

/// A resolver that always yields the same scope.
#[derive(Debug, Clone)]
pub struct FixedScope(pub String);

impl ScopeResolver for FixedScope {
    fn current_scope(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// A location split the way browsers expose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub pathname: String,
    /// Query string including its leading `?`, or empty.
    pub search: String,
}

impl Location {
    pub fn new(pathname: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: search.into(),
        }
    }

    /// Split a path such as `/users?page=2#top` into pathname and search.
    /// The fragment is not part of the scope.
    pub fn parse(path: &str) -> Self {
        let path = path.split('#').next().unwrap_or_default();
        match path.find('?') {
            Some(idx) => Self::new(&path[..idx], &path[idx..]),
            None => Self::new(path, ""),
        }
    }

    /// The scope string, `pathname` followed by `search`.
    pub fn scope(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }
}

/// Resolver deriving the scope from a location the host keeps up to date.
#[derive(Debug, Default)]
pub struct LocationScope {
    location: RwLock<Option<Location>>,
}

impl LocationScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(location: Location) -> Self {
        Self {
            location: RwLock::new(Some(location)),
        }
    }

    /// Record a navigation.
    pub fn navigate(&self, location: Location) {
        *self.location.write() = Some(location);
    }

    pub fn location(&self) -> Option<Location> {
        self.location.read().clone()
    }
}

impl ScopeResolver for LocationScope {
    fn current_scope(&self) -> Option<String> {
        self.location.read().as_ref().map(Location::scope)
    }
}

/// Pick the scope for a call: a non-empty override, else the resolver,
/// else the fallback.
pub(crate) fn resolve_scope(
    explicit: Option<&str>,
    resolver: &dyn ScopeResolver,
    fallback: &str,
) -> String {
    match explicit {
        Some(scope) if !scope.is_empty() => scope.to_string(),
        _ => resolver
            .current_scope()
            .filter(|scope| !scope.is_empty())
            .unwrap_or_else(|| fallback.to_string()),
    }
}
