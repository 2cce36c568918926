//! Extension module - named, configured units of behaviour.
//!
//! Extensions are registered during a bounded bootstrap phase
//! ([`ExtensionBootstrap`]) together with immutable default metadata
//! ([`ExtensionDefaults`]). The finished [`ExtensionRegistry`] is read-only;
//! looking a name up always returns the same [`ExtensionDescriptor`].
//!
//! A registry can also be installed process-wide with [`install`], queried
//! with [`lookup`] and removed again with [`teardown`]. Outside that window
//! lookups fail with [`BusframeError::Uninitialized`].

mod descriptor;
mod registry;
mod validation;

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{BusframeError, Result};

pub use descriptor::{ExtensionDefaults, ExtensionDescriptor};
pub use registry::{ExtensionBootstrap, ExtensionRegistry};
pub use validation::{
    ValidationFailure, ValidationPolicy, ValidationPolicyFactory, FALLBACK_EXCEPTION_KIND,
};

/// Implementation ids of the built-in extension factories.
pub mod ids {
    /// [`ValidationPolicyFactory`](super::ValidationPolicyFactory)
    pub const VALIDATION_POLICY: &str = "busframe.extension.validation-policy";
}

/// A unit of behaviour registered by name.
pub trait Extension: Any + Send + Sync {
    /// Short kind name for logs.
    fn kind(&self) -> &str;

    /// Access for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Creates extension instances from declaration properties.
///
/// Discovered through the `dyn ExtensionFactory` contract.
pub trait ExtensionFactory: Send + Sync {
    /// Build one instance.
    fn create(&self, properties: &BTreeMap<String, String>) -> Result<Arc<dyn Extension>>;
}

static INSTALLED: RwLock<Option<Arc<ExtensionRegistry>>> = RwLock::new(None);

/// Install `registry` process-wide.
///
/// Fails with `Configuration` if a registry is already installed.
pub fn install(registry: ExtensionRegistry) -> Result<Arc<ExtensionRegistry>> {
    let mut slot = INSTALLED.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(BusframeError::Configuration(
            "Extension registry already installed".to_string(),
        ));
    }
    let registry = Arc::new(registry);
    *slot = Some(registry.clone());
    tracing::debug!("Installed extension registry ({} extensions)", registry.len());
    Ok(registry)
}

/// The installed registry.
pub fn installed() -> Result<Arc<ExtensionRegistry>> {
    INSTALLED
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(BusframeError::Uninitialized)
}

/// Look `name` up in the installed registry.
pub fn lookup(name: &str) -> Result<Arc<ExtensionDescriptor>> {
    installed()?.get(name)
}

/// Remove the installed registry, returning it.
///
/// Descriptors already handed out stay valid.
pub fn teardown() -> Option<Arc<ExtensionRegistry>> {
    let removed = INSTALLED
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if removed.is_some() {
        tracing::debug!("Extension registry torn down");
    }
    removed
}
