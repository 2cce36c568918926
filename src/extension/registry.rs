//! Extension bootstrap and the finished, read-only registry.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use busframe::extension::{ExtensionBootstrap, ExtensionDefaults, ValidationPolicy};
//!
//! let mut bootstrap = ExtensionBootstrap::new();
//! bootstrap
//!     .register(
//!         "customValidator",
//!         Arc::new(ValidationPolicy::new()),
//!         ExtensionDefaults::new().exception_kind("java.lang.RuntimeException"),
//!     )
//!     .unwrap();
//!
//! let registry = bootstrap.finish();
//! let descriptor = registry.get("customValidator").unwrap();
//! assert_eq!(descriptor.default_exception_kind(), Some("java.lang.RuntimeException"));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::{Extension, ExtensionDefaults, ExtensionDescriptor, ExtensionFactory};
use crate::config::ExtensionDeclaration;
use crate::discovery::CapabilityRegistry;
use crate::error::{BusframeError, Result};

/// Bootstrap phase: collects extensions until [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct ExtensionBootstrap {
    descriptors: HashMap<String, Arc<ExtensionDescriptor>>,
    order: Vec<String>,
}

impl ExtensionBootstrap {
    /// Start an empty bootstrap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bootstrap from declarations, resolving each implementation
    /// through the `dyn ExtensionFactory` contract.
    pub fn from_declarations(
        registry: &CapabilityRegistry,
        declarations: &[ExtensionDeclaration],
    ) -> Result<Self> {
        let mut bootstrap = Self::new();
        for declaration in declarations {
            let factory = registry.instantiate::<dyn ExtensionFactory>(&declaration.implementation)?;
            let instance = factory.create(&declaration.properties)?;
            bootstrap.register(&declaration.name, instance, declaration.defaults())?;
        }
        Ok(bootstrap)
    }

    /// Register an extension under `name`.
    ///
    /// Fails with `Configuration` if the name is already taken.
    pub fn register(
        &mut self,
        name: &str,
        instance: Arc<dyn Extension>,
        defaults: ExtensionDefaults,
    ) -> Result<()> {
        if self.descriptors.contains_key(name) {
            return Err(BusframeError::Configuration(format!(
                "Extension '{}' registered twice",
                name
            )));
        }
        tracing::debug!("Registered extension '{}' ({})", name, instance.kind());
        self.descriptors.insert(
            name.to_string(),
            Arc::new(ExtensionDescriptor::new(name, instance, defaults)),
        );
        self.order.push(name.to_string());
        Ok(())
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// End the bootstrap phase.
    pub fn finish(self) -> ExtensionRegistry {
        ExtensionRegistry {
            descriptors: self.descriptors,
            order: self.order,
        }
    }
}

/// Read-only map from extension name to descriptor.
#[derive(Debug)]
pub struct ExtensionRegistry {
    descriptors: HashMap<String, Arc<ExtensionDescriptor>>,
    order: Vec<String>,
}

impl ExtensionRegistry {
    /// Descriptor registered under `name`. Every call returns the same `Arc`.
    pub fn get(&self, name: &str) -> Result<Arc<ExtensionDescriptor>> {
        self.descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| BusframeError::NotFound(format!("extension '{}'", name)))
    }

    /// Instance registered under `name`, downcast to `T`.
    pub fn get_as<T: Extension>(&self, name: &str) -> Result<&T> {
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| BusframeError::NotFound(format!("extension '{}'", name)))?;
        descriptor.instance_as::<T>().ok_or_else(|| {
            BusframeError::NotFound(format!(
                "extension '{}' is a {}, not the requested type",
                name,
                descriptor.instance().kind()
            ))
        })
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
