//! Operator registration.
//!
//! The registry is built once at startup from the configured list of
//! qualified identifiers (`pkg.sub.Name`), resolved against the catalog of
//! operators compiled into the binary. It is immutable while the worker
//! consumes: no operator is added or removed after startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::operator::Descriptor;

/// Errors that abort registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The identifier has no module segment.
    #[error("invalid operator identifier {0:?}")]
    InvalidIdentifier(String),

    /// The module segment does not exist in the catalog.
    #[error("no module named {0:?}")]
    ModuleNotFound(String),

    /// The module exists but exports no such symbol.
    #[error("module {module:?} has no attribute {symbol:?}")]
    AttributeMissing {
        /// Module path that was searched.
        module: String,
        /// Missing symbol name.
        symbol: String,
    },

    /// The symbol exists but is not an operator.
    #[error("{module}.{symbol} is not an operator")]
    NotCallable {
        /// Module path of the export.
        module: String,
        /// Symbol name of the export.
        symbol: String,
    },

    /// The symbol is an abstract descriptor.
    #[error("operator {0} is abstract")]
    Abstract(String),
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A symbol exported by a catalog module.
#[derive(Debug, Clone)]
pub enum Export {
    /// An invocable operator descriptor.
    Operator(Descriptor),
    /// A plain value; resolvable but never registrable.
    Value(Value),
}

/// The operators compiled into the binary, addressable by dotted path.
///
/// The catalog plays the role of module import: the configuration names
/// `pkg.sub.Name` identifiers and the catalog resolves them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    modules: BTreeMap<String, BTreeMap<String, Export>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `descriptor` as `module`.`symbol`.
    pub fn register(&mut self, module: &str, symbol: &str, descriptor: Descriptor) {
        self.insert(module, symbol, Export::Operator(descriptor));
    }

    /// Export a plain value under `module`.`symbol`.
    pub fn export_value(&mut self, module: &str, symbol: &str, value: Value) {
        self.insert(module, symbol, Export::Value(value));
    }

    fn insert(&mut self, module: &str, symbol: &str, export: Export) {
        self.modules
            .entry(module.to_owned())
            .or_default()
            .insert(symbol.to_owned(), export);
    }

    fn lookup(&self, module: &str, symbol: &str) -> Result<&Export, RegistryError> {
        let exports = self
            .modules
            .get(module)
            .ok_or_else(|| RegistryError::ModuleNotFound(module.to_owned()))?;
        exports
            .get(symbol)
            .ok_or_else(|| RegistryError::AttributeMissing {
                module: module.to_owned(),
                symbol: symbol.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable, order-preserving set of registered operators.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<(String, Arc<Descriptor>)>,
}

impl Registry {
    /// Resolve `qualified` identifiers against `catalog`, in order.
    ///
    /// Deterministic for a given configuration; building twice from the same
    /// input yields the same registration order.
    ///
    /// # Errors
    ///
    /// Any identifier that fails to resolve to a concrete operator aborts
    /// the build with the corresponding [`RegistryError`].
    pub fn build(catalog: &Catalog, qualified: &[String]) -> Result<Self, RegistryError> {
        let mut entries = Vec::with_capacity(qualified.len());
        for identifier in qualified {
            let Some((module, symbol)) = identifier.rsplit_once('.') else {
                return Err(RegistryError::InvalidIdentifier(identifier.clone()));
            };
            let descriptor = match catalog.lookup(module, symbol)? {
                Export::Operator(descriptor) => descriptor.clone(),
                Export::Value(_) => {
                    return Err(RegistryError::NotCallable {
                        module: module.to_owned(),
                        symbol: symbol.to_owned(),
                    })
                }
            };
            if descriptor.is_abstract() {
                warn!(operator = symbol, "operator is abstract");
                return Err(RegistryError::Abstract(symbol.to_owned()));
            }
            entries.push((symbol.to_owned(), Arc::new(descriptor)));
        }
        Ok(Self { entries })
    }

    /// Iterate over `(short name, descriptor)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Descriptor>)> {
        self.entries
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    /// Look up a registered operator by short name.
    pub fn get(&self, name: &str) -> Option<&Arc<Descriptor>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, descriptor)| descriptor)
    }

    /// Number of registered operators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
