//! Proxy type cache
//!
//! One synthesized [`ProxyType`] per `(shape, target type)` pair, built
//! lazily on first request and retained for the cache's lifetime. The
//! key space is bounded by the set of distinct instrumented call
//! shapes, so entries are never evicted.
//!
//! Insertion discipline is get-or-add: two threads racing on the same
//! key may both synthesize, but only the first insert is published and
//! the loser's artifact is dropped immediately. A failed synthesis
//! publishes nothing.

use crate::error::DuckTypeError;
use crate::proxy::{synthesize, ProxyInstance, ProxyType};
use calltarget_types::{ShapeId, ShapeRegistry, TypeId, TypeRegistry, Value};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Cache of synthesized proxy types
pub struct ProxyCache {
    types: Arc<TypeRegistry>,
    shapes: Arc<ShapeRegistry>,
    entries: DashMap<(ShapeId, TypeId), Arc<ProxyType>>,
}

impl ProxyCache {
    /// Create an empty cache over the given registries
    pub fn new(types: Arc<TypeRegistry>, shapes: Arc<ShapeRegistry>) -> Arc<Self> {
        Arc::new(Self {
            types,
            shapes,
            entries: DashMap::new(),
        })
    }

    /// The type registry this cache resolves against
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// The shape registry this cache resolves against
    pub fn shapes(&self) -> &Arc<ShapeRegistry> {
        &self.shapes
    }

    /// Get or synthesize the proxy type for a `(shape, target)` pair
    ///
    /// Every call for the same pair observes the same `Arc` identity.
    pub fn get_or_create(
        self: &Arc<Self>,
        shape: ShapeId,
        target: TypeId,
    ) -> Result<Arc<ProxyType>, DuckTypeError> {
        if let Some(entry) = self.entries.get(&(shape, target)) {
            return Ok(entry.clone());
        }

        // Synthesis runs outside the map lock; a concurrent duplicate is
        // allowed and the first insert wins.
        let built = Arc::new(synthesize(self, shape, target)?);
        let published = self
            .entries
            .entry((shape, target))
            .or_insert(built)
            .clone();
        Ok(published)
    }

    /// Match, synthesize, and wrap an instance in one step
    pub fn create(
        self: &Arc<Self>,
        shape: ShapeId,
        instance: Value,
    ) -> Result<ProxyInstance, DuckTypeError> {
        let target = match instance.type_id() {
            Some(id) => id,
            None => return Err(DuckTypeError::TargetObjectInstanceIsNull),
        };
        let proxy_type = self.get_or_create(shape, target)?;
        debug!(shape = shape.raw(), target = target.raw(), "wrapping instance");
        proxy_type.instantiate(instance)
    }

    /// Number of cached proxy types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
