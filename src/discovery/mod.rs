//! Discovery module - runtime capability lookup without static linkage.
//!
//! A *contract* is a trait object type such as `dyn FramingProtocol`. During
//! bootstrap, a [`RegistryBuilder`] records:
//!
//! - a declarative name per contract (the key of its declaration resource),
//! - provider factories keyed by implementation id,
//! - [`ResourceContext`]s holding `services/<contract name>` declarations.
//!
//! After [`RegistryBuilder::build`] the [`CapabilityRegistry`] is immutable
//! and can be shared across tasks. A lookup reads the declaration resource of
//! the requested contract and returns a lazy [`Providers`] sequence; nothing
//! is constructed until iterated.
//!
//! # Example
//!
//! ```
//! use busframe::discovery::CapabilityRegistry;
//! use busframe::protocol::FramingProtocol;
//!
//! let registry = CapabilityRegistry::with_builtins().unwrap();
//! let providers = registry.lookup_providers::<dyn FramingProtocol>();
//!
//! assert_eq!(providers.len(), 4);
//! for protocol in providers.iter() {
//!     println!("{}", protocol.unwrap().name());
//! }
//! ```

mod builtins;
mod context;

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{BusframeError, Result};

use context::{parse_declarations, Declaration};

pub use context::{ResourceContext, SERVICES_PREFIX};

/// Name of the context used by lookups that do not name one.
pub const DEFAULT_CONTEXT: &str = "default";

/// Declarative names of the built-in contracts.
pub mod contracts {
    /// `dyn FramingProtocol`
    pub const FRAMING_PROTOCOL: &str = "busframe.FramingProtocol";
    /// `dyn ObjectCodec`
    pub const OBJECT_CODEC: &str = "busframe.ObjectCodec";
    /// `dyn ExtensionFactory`
    pub const EXTENSION_FACTORY: &str = "busframe.ExtensionFactory";
}

/// Factory stored for a provider of contract `C`.
type Factory<C> = Arc<dyn Fn() -> Result<Box<C>> + Send + Sync>;

/// Type-erased provider registration.
struct ProviderEntry {
    contract: TypeId,
    contract_type: &'static str,
    factory: Box<dyn Any + Send + Sync>,
}

/// Bootstrap-phase builder for a [`CapabilityRegistry`].
pub struct RegistryBuilder {
    contracts: HashMap<TypeId, String>,
    providers: HashMap<String, ProviderEntry>,
    contexts: HashMap<String, ResourceContext>,
    default_context: String,
    errors: Vec<String>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            contracts: HashMap::new(),
            providers: HashMap::new(),
            contexts: HashMap::new(),
            default_context: DEFAULT_CONTEXT.to_string(),
            errors: Vec::new(),
        }
    }

    /// Attach a declarative name to contract `C`.
    pub fn contract<C: ?Sized + 'static>(mut self, name: &str) -> Self {
        let type_id = TypeId::of::<C>();
        let clash = self
            .contracts
            .iter()
            .find(|(id, existing)| **id != type_id && existing.as_str() == name);
        if clash.is_some() {
            self.errors.push(format!(
                "Contract name '{}' is already used by another contract type",
                name
            ));
            return self;
        }
        if let Some(existing) = self.contracts.get(&type_id) {
            if existing != name {
                self.errors.push(format!(
                    "Contract {} is already named '{}'",
                    type_name::<C>(),
                    existing
                ));
                return self;
            }
        }
        self.contracts.insert(type_id, name.to_string());
        self
    }

    /// Register a provider factory for contract `C` under `implementation_id`.
    pub fn provider<C, F>(mut self, implementation_id: &str, factory: F) -> Self
    where
        C: ?Sized + 'static,
        F: Fn() -> Result<Box<C>> + Send + Sync + 'static,
    {
        if !context::is_valid_id(implementation_id) {
            self.errors
                .push(format!("Invalid implementation id '{}'", implementation_id));
            return self;
        }
        if self.providers.contains_key(implementation_id) {
            self.errors.push(format!(
                "Implementation id '{}' registered twice",
                implementation_id
            ));
            return self;
        }

        let factory: Factory<C> = Arc::new(factory);
        self.providers.insert(
            implementation_id.to_string(),
            ProviderEntry {
                contract: TypeId::of::<C>(),
                contract_type: type_name::<C>(),
                factory: Box::new(factory),
            },
        );
        self
    }

    /// Add a resource-loading context. Resources of a context with the same
    /// name are merged.
    pub fn context(mut self, context: ResourceContext) -> Self {
        match self.contexts.get_mut(context.name()) {
            Some(existing) => existing.merge(context),
            None => {
                self.contexts.insert(context.name().to_string(), context);
            }
        }
        self
    }

    /// Choose the context used by [`CapabilityRegistry::lookup_providers`].
    pub fn default_context(mut self, name: &str) -> Self {
        self.default_context = name.to_string();
        self
    }

    /// Register the built-in protocols, codecs and extension factories, and
    /// declare them in the default context.
    pub fn with_builtins(self) -> Self {
        builtins::register(self)
    }

    /// Finish bootstrap.
    ///
    /// Fails with `Configuration` if any registration was rejected.
    pub fn build(self) -> Result<CapabilityRegistry> {
        if !self.errors.is_empty() {
            return Err(BusframeError::Configuration(self.errors.join("; ")));
        }
        tracing::debug!(
            "Capability registry built: {} contracts, {} providers, {} contexts",
            self.contracts.len(),
            self.providers.len(),
            self.contexts.len()
        );
        Ok(CapabilityRegistry {
            contracts: self.contracts,
            providers: self.providers,
            contexts: self.contexts,
            default_context: self.default_context,
            cache: Mutex::new(HashMap::new()),
        })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable table of contracts, providers and declaration contexts.
pub struct CapabilityRegistry {
    contracts: HashMap<TypeId, String>,
    providers: HashMap<String, ProviderEntry>,
    contexts: HashMap<String, ResourceContext>,
    default_context: String,
    /// Parsed declarations per (context, contract).
    cache: Mutex<HashMap<(String, TypeId), Arc<[Declaration]>>>,
}

impl CapabilityRegistry {
    /// Start a bootstrap phase.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry holding only the built-in capabilities.
    pub fn with_builtins() -> Result<Self> {
        RegistryBuilder::new().with_builtins().build()
    }

    /// Name of the default context.
    pub fn default_context(&self) -> &str {
        &self.default_context
    }

    /// Declarative name of contract `C`, if registered.
    pub fn contract_name<C: ?Sized + 'static>(&self) -> Option<&str> {
        self.contracts.get(&TypeId::of::<C>()).map(String::as_str)
    }

    /// Providers of `C` declared in the default context.
    pub fn lookup_providers<C: ?Sized + 'static>(&self) -> Providers<'_, C> {
        self.lookup_providers_in::<C>(&self.default_context)
    }

    /// Providers of `C` declared in the named context.
    ///
    /// An unknown context, an unnamed contract, or a missing declaration
    /// resource all yield an empty sequence.
    pub fn lookup_providers_in<C: ?Sized + 'static>(&self, context: &str) -> Providers<'_, C> {
        let contract = self
            .contract_name::<C>()
            .unwrap_or_else(|| type_name::<C>())
            .to_string();
        let declarations = self.declarations::<C>(context);
        Providers {
            registry: self,
            contract,
            declarations,
            _contract: PhantomData,
        }
    }

    /// First provider of `C` that constructs successfully.
    pub fn first<C: ?Sized + 'static>(&self) -> Result<Box<C>> {
        let providers = self.lookup_providers::<C>();
        for provider in providers.iter() {
            match provider {
                Ok(provider) => return Ok(provider),
                Err(e) => tracing::warn!("Skipping provider: {}", e),
            }
        }
        Err(BusframeError::NotFound(format!(
            "no provider for {}",
            providers.contract()
        )))
    }

    /// Construct the provider registered under `implementation_id`.
    pub fn instantiate<C: ?Sized + 'static>(&self, implementation_id: &str) -> Result<Box<C>> {
        let entry = self.providers.get(implementation_id).ok_or_else(|| {
            BusframeError::NotFound(format!("implementation '{}'", implementation_id))
        })?;
        let factory = entry.factory.downcast_ref::<Factory<C>>().ok_or_else(|| {
            BusframeError::NotFound(format!(
                "implementation '{}' provides {}, not {}",
                implementation_id,
                entry.contract_type,
                type_name::<C>()
            ))
        })?;
        factory()
    }

    /// Parsed declarations of `C` in `context`, cached after first use.
    fn declarations<C: ?Sized + 'static>(&self, context: &str) -> Arc<[Declaration]> {
        let key = (context.to_string(), TypeId::of::<C>());
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }

        let parsed: Arc<[Declaration]> = match (self.contexts.get(context), self.contract_name::<C>()) {
            (Some(ctx), Some(name)) => match ctx.services(name) {
                Some(text) => parse_declarations(text).into(),
                None => Arc::from(Vec::new()),
            },
            (None, _) => {
                tracing::debug!("Unknown resource context '{}'", context);
                Arc::from(Vec::new())
            }
            (_, None) => Arc::from(Vec::new()),
        };
        cache.insert(key, parsed.clone());
        parsed
    }

    /// Construct one declared provider.
    fn construct<C: ?Sized + 'static>(&self, contract: &str, id: &str) -> Result<Box<C>> {
        let discovery = |reason: String| BusframeError::Discovery {
            contract: contract.to_string(),
            reason,
        };

        let entry = self
            .providers
            .get(id)
            .ok_or_else(|| discovery(format!("unknown implementation '{}'", id)))?;
        if entry.contract != TypeId::of::<C>() {
            return Err(discovery(format!(
                "implementation '{}' provides {}",
                id, entry.contract_type
            )));
        }
        let factory = entry
            .factory
            .downcast_ref::<Factory<C>>()
            .ok_or_else(|| discovery(format!("implementation '{}' has a foreign factory", id)))?;
        factory().map_err(|e| discovery(format!("implementation '{}' failed: {}", id, e)))
    }
}

/// Lazy, restartable sequence of providers for contract `C`.
pub struct Providers<'r, C: ?Sized> {
    registry: &'r CapabilityRegistry,
    contract: String,
    declarations: Arc<[Declaration]>,
    _contract: PhantomData<fn() -> Box<C>>,
}

impl<'r, C: ?Sized + 'static> Providers<'r, C> {
    /// Start a fresh pass over the declared providers.
    pub fn iter(&self) -> ProviderIter<'_, C> {
        ProviderIter {
            providers: self,
            position: 0,
        }
    }

    /// Declarative name of the contract.
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Number of declarations, malformed ones included.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Whether nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Well-formed implementation ids, in declaration order.
    pub fn implementation_ids(&self) -> Vec<&str> {
        self.declarations
            .iter()
            .filter_map(|d| match d {
                Declaration::Implementation(id) => Some(id.as_str()),
                Declaration::Malformed { .. } => None,
            })
            .collect()
    }
}

impl<'a, 'r, C: ?Sized + 'static> IntoIterator for &'a Providers<'r, C> {
    type Item = Result<Box<C>>;
    type IntoIter = ProviderIter<'a, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`Providers`] sequence.
pub struct ProviderIter<'p, C: ?Sized> {
    providers: &'p Providers<'p, C>,
    position: usize,
}

impl<'p, C: ?Sized + 'static> Iterator for ProviderIter<'p, C> {
    type Item = Result<Box<C>>;

    fn next(&mut self) -> Option<Self::Item> {
        let declaration = self.providers.declarations.get(self.position)?;
        self.position += 1;

        let contract = &self.providers.contract;
        let item = match declaration {
            Declaration::Implementation(id) => self.providers.registry.construct::<C>(contract, id),
            Declaration::Malformed { line, text } => Err(BusframeError::Discovery {
                contract: contract.clone(),
                reason: format!("malformed declaration '{}' on line {}", text, line),
            }),
        };
        if let Err(e) = &item {
            tracing::warn!("{}", e);
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.providers.declarations.len() - self.position;
        (left, Some(left))
    }
}
