use std::collections::HashMap;
use std::sync::Arc;

use super::unit::UnitDescriptor;

// ---------------------------------------------------------------------------
// LookupError
// ---------------------------------------------------------------------------

/// Returned when no unit is registered under a (namespace, operation) pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("can not find service {namespace}[{operation}]")]
pub struct LookupError {
    pub namespace: String,
    pub operation: String,
}

// ---------------------------------------------------------------------------
// UnitRegistry
// ---------------------------------------------------------------------------

/// Static mapping from (namespace, operation) to unit descriptors.
///
/// Registration takes `&mut self`, so it can only happen while the registry
/// is exclusively owned during startup. Once the registry is frozen behind an
/// `Arc` it is read-only and lookups need no locking. Code that insists on
/// registering from several threads has to wrap the registry in its own lock
/// first; nothing here synchronizes it.
///
/// Registering the same pair twice silently replaces the earlier descriptor
/// (last write wins). Units are re-registered this way to override defaults.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: HashMap<String, HashMap<String, Arc<UnitDescriptor>>>,
}

impl UnitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `descriptor` under `namespace`/`operation`, replacing any
    /// previous entry for that pair.
    pub fn register(
        &mut self,
        namespace: impl Into<String>,
        operation: impl Into<String>,
        descriptor: UnitDescriptor,
    ) -> &mut Self {
        let namespace = namespace.into();
        let operation = operation.into();
        tracing::debug!(
            %namespace,
            %operation,
            priority = %descriptor.priority(),
            "unit registered"
        );
        self.units
            .entry(namespace)
            .or_default()
            .insert(operation, Arc::new(descriptor));
        self
    }

    /// Retrieves the descriptor for `namespace`/`operation`.
    ///
    /// # Errors
    ///
    /// Returns `LookupError` when nothing is registered under that pair.
    pub fn lookup(&self, namespace: &str, operation: &str) -> Result<Arc<UnitDescriptor>, LookupError> {
        self.units
            .get(namespace)
            .and_then(|ops| ops.get(operation))
            .cloned()
            .ok_or_else(|| LookupError {
                namespace: namespace.to_string(),
                operation: operation.to_string(),
            })
    }

    /// Total number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered namespaces, sorted.
    #[must_use]
    pub fn namespaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.units.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Freezes the registry for shared read-only use.
    #[must_use]
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
