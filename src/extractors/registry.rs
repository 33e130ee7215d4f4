//! Custom property types
//!
//! Schemas may name types the interpreter does not know. Those are looked up in
//! a [`TypeRegistry`] by name. Register everything at startup: the registry
//! seals itself on the first lookup and rejects later registrations.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::selection::Selection;
use crate::error::RegistryError;
use crate::schema::Schema;
use crate::value::Value;

/// Resolver for a custom property type
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, schema: &Schema, node: &Selection<'_>) -> Value;
}

impl<F> TypeResolver for F
where
    F: Fn(&Schema, &Selection<'_>) -> Value + Send + Sync,
{
    fn resolve(&self, schema: &Schema, node: &Selection<'_>) -> Value {
        self(schema, node)
    }
}

/// Mapping from type name to resolver
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<dyn TypeResolver>>>,
    sealed: AtomicBool,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` under `name`, replacing any earlier entry
    pub fn register(
        &self,
        name: impl Into<String>,
        resolver: impl TypeResolver + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.is_sealed() {
            return Err(RegistryError::Sealed { name });
        }
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(name = %name, "Registered custom type");
        types.insert(name, Arc::new(resolver));
        Ok(())
    }

    /// Register a closure as a custom type
    pub fn register_fn<F>(&self, name: impl Into<String>, resolver: F) -> Result<(), RegistryError>
    where
        F: Fn(&Schema, &Selection<'_>) -> Value + Send + Sync + 'static,
    {
        self.register(name, resolver)
    }

    /// Look up a resolver. Seals the registry.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TypeResolver>> {
        self.sealed.store(true, Ordering::Release);
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .types
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("TypeRegistry")
            .field("types", &names)
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

static GLOBAL: Lazy<Arc<TypeRegistry>> = Lazy::new(|| Arc::new(TypeRegistry::new()));

/// Process-wide registry used by default extractors
pub fn global() -> Arc<TypeRegistry> {
    GLOBAL.clone()
}

/// Register a custom type in the process-wide registry
pub fn register_type<F>(name: impl Into<String>, resolver: F) -> Result<(), RegistryError>
where
    F: Fn(&Schema, &Selection<'_>) -> Value + Send + Sync + 'static,
{
    GLOBAL.register_fn(name, resolver)
}
