//! Extension descriptors and their immutable default metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::Extension;

/// Default metadata attached to an extension at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionDefaults {
    exception_kind: Option<String>,
    properties: BTreeMap<String, String>,
}

impl ExtensionDefaults {
    /// Empty defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default exception kind.
    pub fn exception_kind(mut self, kind: &str) -> Self {
        self.exception_kind = Some(kind.to_string());
        self
    }

    /// Add a named property.
    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Default exception kind, if any.
    pub fn default_exception_kind(&self) -> Option<&str> {
        self.exception_kind.as_deref()
    }

    /// Property by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// All properties, ordered by key.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

/// A registered extension: name, instance and defaults.
pub struct ExtensionDescriptor {
    name: String,
    instance: Arc<dyn Extension>,
    defaults: ExtensionDefaults,
}

impl ExtensionDescriptor {
    pub(crate) fn new(name: &str, instance: Arc<dyn Extension>, defaults: ExtensionDefaults) -> Self {
        Self {
            name: name.to_string(),
            instance,
            defaults,
        }
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The extension instance.
    pub fn instance(&self) -> &Arc<dyn Extension> {
        &self.instance
    }

    /// Default metadata, read-only.
    pub fn defaults(&self) -> &ExtensionDefaults {
        &self.defaults
    }

    /// Shortcut for `defaults().default_exception_kind()`.
    pub fn default_exception_kind(&self) -> Option<&str> {
        self.defaults.default_exception_kind()
    }

    /// Downcast the instance.
    pub fn instance_as<T: Extension>(&self) -> Option<&T> {
        self.instance.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .field("kind", &self.instance.kind())
            .field("defaults", &self.defaults)
            .finish()
    }
}
