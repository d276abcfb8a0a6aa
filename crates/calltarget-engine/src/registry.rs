//! Integration registry and lifecycle
//!
//! Tracks every registered integration's descriptor and enabled state.
//! An integration starts enabled unless configuration disables it, and
//! is disabled permanently when generation fails for one of its
//! callbacks: subsequent calls to the instrumented sites become no-ops
//! rather than re-attempting synthesis.

use crate::callbacks::IntegrationDescriptor;
use crate::error::CallTargetError;
use crate::settings::InstrumentationSettings;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Unique identifier for a registered integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegrationId(pub(crate) u32);

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrationId({})", self.0)
    }
}

/// Snapshot row for the telemetry collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationState {
    /// Integration name
    pub name: String,
    /// Whether the integration is currently enabled
    pub enabled: bool,
    /// Why it was disabled, when it was
    pub disabled_reason: Option<String>,
}

struct IntegrationEntry {
    descriptor: Arc<IntegrationDescriptor>,
    enabled: AtomicBool,
    disabled_reason: RwLock<Option<String>>,
}

/// Registry of integrations and their enable/disable state
pub struct IntegrationRegistry {
    entries: RwLock<Vec<Arc<IntegrationEntry>>>,
    by_name: DashMap<String, IntegrationId>,
    settings: InstrumentationSettings,
}

impl IntegrationRegistry {
    /// Create a registry with default settings (everything enabled)
    pub fn new() -> Self {
        Self::with_settings(InstrumentationSettings::default())
    }

    /// Create a registry seeded from configuration
    pub fn with_settings(settings: InstrumentationSettings) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            by_name: DashMap::new(),
            settings,
        }
    }

    /// Register an integration, assigning it an id
    ///
    /// The initial enabled state comes from the settings the registry
    /// was created with.
    pub fn register(
        &self,
        descriptor: IntegrationDescriptor,
    ) -> Result<IntegrationId, CallTargetError> {
        let mut entries = self.entries.write();
        if self.by_name.contains_key(&descriptor.name) {
            return Err(CallTargetError::DuplicateIntegration {
                name: descriptor.name.clone(),
            });
        }
        let id = IntegrationId(entries.len() as u32);
        let enabled = self.settings.is_integration_enabled(&descriptor.name);
        if !enabled {
            warn!(integration = %descriptor.name, "integration disabled by configuration");
        }
        self.by_name.insert(descriptor.name.clone(), id);
        entries.push(Arc::new(IntegrationEntry {
            descriptor: Arc::new(descriptor),
            enabled: AtomicBool::new(enabled),
            disabled_reason: RwLock::new(None),
        }));
        Ok(id)
    }

    /// Resolve a descriptor by id
    pub fn descriptor(
        &self,
        id: IntegrationId,
    ) -> Result<Arc<IntegrationDescriptor>, CallTargetError> {
        self.entry(id).map(|entry| entry.descriptor.clone())
    }

    /// Resolve an integration id by name
    pub fn lookup(&self, name: &str) -> Option<IntegrationId> {
        self.by_name.get(name).map(|entry| *entry)
    }

    /// Whether the integration is enabled (unknown ids are not)
    pub fn is_enabled(&self, id: IntegrationId) -> bool {
        self.entry(id)
            .map(|entry| entry.enabled.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Disable an integration for the remainder of the process
    ///
    /// Idempotent; the warning is emitted only on the first call.
    pub fn disable(&self, id: IntegrationId, reason: &str) {
        if let Ok(entry) = self.entry(id) {
            if entry.enabled.swap(false, Ordering::AcqRel) {
                warn!(
                    integration = %entry.descriptor.name,
                    reason,
                    "disabling integration"
                );
                *entry.disabled_reason.write() = Some(reason.to_string());
            }
        }
    }

    /// Snapshot of every integration's state
    pub fn snapshot(&self) -> Vec<IntegrationState> {
        self.entries
            .read()
            .iter()
            .map(|entry| IntegrationState {
                name: entry.descriptor.name.clone(),
                enabled: entry.enabled.load(Ordering::Acquire),
                disabled_reason: entry.disabled_reason.read().clone(),
            })
            .collect()
    }

    /// Number of registered integrations
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: IntegrationId) -> Result<Arc<IntegrationEntry>, CallTargetError> {
        self.entries
            .read()
            .get(id.0 as usize)
            .cloned()
            .ok_or(CallTargetError::UnknownIntegrationId { id: id.0 })
    }
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
