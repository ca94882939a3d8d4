//! Value providers
//!
//! Caller-supplied attribute sources for the reserved `$config` and
//! instance lookups of a mapping.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Scope name of the external configuration provider.
pub const CONFIG_SCOPE: &str = "config";

/// Scope name of the owning-instance provider.
pub const INSTANCE_SCOPE: &str = "self";

/// A source of named attributes
pub trait ValueProvider: Send + Sync {
    /// Value of attribute `name`, if present
    fn attribute(&self, name: &str) -> Option<Value>;
}

impl ValueProvider for Map<String, Value> {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl ValueProvider for HashMap<String, Value> {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Provider backed by a closure
pub struct FnProvider<F>(pub F);

impl<F> ValueProvider for FnProvider<F>
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn attribute(&self, name: &str) -> Option<Value> {
        (self.0)(name)
    }
}

/// Named providers consulted by the engine
#[derive(Clone, Default)]
pub struct Providers {
    scopes: HashMap<String, Arc<dyn ValueProvider>>,
}

impl Providers {
    /// Create an empty set of providers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `scope`, replacing any previous one
    pub fn insert(&mut self, scope: impl Into<String>, provider: impl ValueProvider + 'static) {
        self.scopes.insert(scope.into(), Arc::new(provider));
    }

    /// Builder form of [`Providers::insert`]
    #[must_use]
    pub fn with(
        mut self,
        scope: impl Into<String>,
        provider: impl ValueProvider + 'static,
    ) -> Self {
        self.insert(scope, provider);
        self
    }

    /// Register the external configuration provider
    #[must_use]
    pub fn with_config(self, provider: impl ValueProvider + 'static) -> Self {
        self.with(CONFIG_SCOPE, provider)
    }

    /// Register the owning-instance provider
    #[must_use]
    pub fn with_instance(self, provider: impl ValueProvider + 'static) -> Self {
        self.with(INSTANCE_SCOPE, provider)
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains_key(scope)
    }

    /// Registered scope names, sorted
    #[must_use]
    pub fn scope_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scopes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up attribute `name` in `scope`
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is registered for `scope` or the
    /// provider lacks the attribute.
    pub fn attribute(&self, scope: &str, name: &str) -> crate::Result<Value> {
        let provider = self
            .scopes
            .get(scope)
            .ok_or_else(|| crate::Error::MissingProvider {
                scope: scope.to_string(),
            })?;

        provider
            .attribute(name)
            .ok_or_else(|| crate::Error::MissingAttribute {
                scope: scope.to_string(),
                name: name.to_string(),
            })
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("scopes", &self.scope_names())
            .finish()
    }
}
