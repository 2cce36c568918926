//! Resource-loading contexts and the declaration text format.
//!
//! A declaration resource lives at `services/<contract name>` and lists one
//! implementation id per line:
//!
//! ```text
//! # framing protocols shipped with the gateway
//! busframe.protocol.length-prefixed
//! acme.protocol.stx-etx   # trailing comments are fine
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Directory prefix of declaration resources.
pub const SERVICES_PREFIX: &str = "services/";

/// Named scope holding declaration resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceContext {
    name: String,
    resources: HashMap<String, String>,
}

impl ResourceContext {
    /// Create an empty context.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resources: HashMap::new(),
        }
    }

    /// Load every file under `<dir>/services/` as a declaration resource.
    ///
    /// A missing `services` directory yields an empty context.
    pub fn from_dir(name: &str, dir: impl AsRef<Path>) -> Result<Self> {
        let mut context = Self::new(name);
        let services = dir.as_ref().join("services");
        if !services.is_dir() {
            return Ok(context);
        }
        for entry in fs::read_dir(&services)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let contract = entry.file_name().to_string_lossy().into_owned();
            let text = fs::read_to_string(entry.path())?;
            context = context.resource(&format!("{}{}", SERVICES_PREFIX, contract), &text);
        }
        Ok(context)
    }

    /// Add a resource. Text for an existing path is appended.
    pub fn resource(mut self, path: &str, text: &str) -> Self {
        self.add_resource(path, text);
        self
    }

    /// Declare implementation ids for a contract name.
    pub fn declare(self, contract: &str, implementation_ids: &[&str]) -> Self {
        let text = implementation_ids.join("\n");
        self.resource(&format!("{}{}", SERVICES_PREFIX, contract), &text)
    }

    /// Context name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource text at `path`.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.resources.get(path).map(String::as_str)
    }

    /// Declaration resource of a contract.
    pub fn services(&self, contract: &str) -> Option<&str> {
        self.get(&format!("{}{}", SERVICES_PREFIX, contract))
    }

    pub(crate) fn merge(&mut self, other: ResourceContext) {
        for (path, text) in other.resources {
            self.add_resource(&path, &text);
        }
    }

    fn add_resource(&mut self, path: &str, text: &str) {
        match self.resources.get_mut(path) {
            Some(existing) => {
                if !existing.is_empty() && !existing.ends_with('\n') {
                    existing.push('\n');
                }
                existing.push_str(text);
            }
            None => {
                self.resources.insert(path.to_string(), text.to_string());
            }
        }
    }
}

/// One parsed line of a declaration resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Declaration {
    /// A well-formed implementation id.
    Implementation(String),
    /// A line that is not a valid id.
    Malformed { line: usize, text: String },
}

/// Parse declaration text.
///
/// Comments and blank lines are dropped. Repeated ids are kept once, at
/// their first position.
pub(crate) fn parse_declarations(text: &str) -> Vec<Declaration> {
    let mut seen = Vec::<&str>::new();
    let mut declarations = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();

        if line.is_empty() {
            continue;
        }
        if !is_valid_id(line) {
            declarations.push(Declaration::Malformed {
                line: index + 1,
                text: line.to_string(),
            });
            continue;
        }
        if seen.contains(&line) {
            continue;
        }
        seen.push(line);
        declarations.push(Declaration::Implementation(line.to_string()));
    }

    declarations
}

/// Implementation ids are `[A-Za-z0-9_.:-]+`.
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'-'))
}
