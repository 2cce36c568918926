//! Validation policy extension.
//!
//! Checks an inbound message against a size limit and a set of required
//! top-level JSON fields. A failure carries the exception kind configured on
//! the policy, or else the default registered with its descriptor.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::{Extension, ExtensionDefaults, ExtensionFactory};
use crate::error::{BusframeError, Result};
use crate::message::Message;

/// Exception kind used when neither the policy nor its defaults name one.
pub const FALLBACK_EXCEPTION_KIND: &str = "busframe.ValidationFailure";

/// A message rejected by a [`ValidationPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{exception_kind}: {reason}")]
pub struct ValidationFailure {
    /// Kind reported to the caller.
    pub exception_kind: String,
    /// What was wrong.
    pub reason: String,
}

/// Size and shape checks for inbound messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationPolicy {
    max_payload_size: Option<usize>,
    required_fields: Vec<String>,
    exception_kind: Option<String>,
}

impl ValidationPolicy {
    /// Policy that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject payloads larger than `max` bytes.
    pub fn max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = Some(max);
        self
    }

    /// Require a top-level field on structured messages.
    pub fn require_field(mut self, field: &str) -> Self {
        self.required_fields.push(field.to_string());
        self
    }

    /// Override the exception kind from the descriptor defaults.
    pub fn exception_kind(mut self, kind: &str) -> Self {
        self.exception_kind = Some(kind.to_string());
        self
    }

    /// Build a policy from string properties.
    ///
    /// Recognised keys: `max_payload_size`, `required_fields`
    /// (comma-separated) and `exception_kind`.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self> {
        let mut policy = Self::new();
        if let Some(max) = properties.get("max_payload_size") {
            let max = max.trim().parse::<usize>().map_err(|e| {
                BusframeError::Configuration(format!("Invalid max_payload_size '{}': {}", max, e))
            })?;
            policy = policy.max_payload_size(max);
        }
        if let Some(fields) = properties.get("required_fields") {
            for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                policy = policy.require_field(field);
            }
        }
        if let Some(kind) = properties.get("exception_kind") {
            policy = policy.exception_kind(kind);
        }
        Ok(policy)
    }

    /// Validate one message.
    pub fn validate(
        &self,
        message: &Message,
        defaults: &ExtensionDefaults,
    ) -> std::result::Result<(), ValidationFailure> {
        let fail = |reason: String| ValidationFailure {
            exception_kind: self
                .exception_kind
                .as_deref()
                .or_else(|| defaults.default_exception_kind())
                .unwrap_or(FALLBACK_EXCEPTION_KIND)
                .to_string(),
            reason,
        };

        if let Some(max) = self.max_payload_size {
            let size = match message {
                Message::Bytes(bytes) => bytes.len(),
                Message::Object(value) => serde_json::to_vec(value)
                    .map(|encoded| encoded.len())
                    .map_err(|e| fail(format!("payload not serializable: {}", e)))?,
            };
            if size > max {
                return Err(fail(format!(
                    "payload of {} bytes exceeds limit of {}",
                    size, max
                )));
            }
        }

        if self.required_fields.is_empty() {
            return Ok(());
        }
        let object = match message.as_object().and_then(|value| value.as_object()) {
            Some(object) => object,
            None => return Err(fail("structured object payload required".to_string())),
        };
        for field in &self.required_fields {
            if !object.contains_key(field) {
                return Err(fail(format!("missing required field '{}'", field)));
            }
        }
        Ok(())
    }
}

impl Extension for ValidationPolicy {
    fn kind(&self) -> &str {
        "validation-policy"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Creates [`ValidationPolicy`] instances from declaration properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationPolicyFactory;

impl ExtensionFactory for ValidationPolicyFactory {
    fn create(&self, properties: &BTreeMap<String, String>) -> Result<Arc<dyn Extension>> {
        Ok(Arc::new(ValidationPolicy::from_properties(properties)?))
    }
}
