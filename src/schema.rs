//! Schema adaptation for operator contracts.
//!
//! A [`SchemaAdapter`] turns one side of an operator contract into two
//! things: a validator that checks an untyped JSON value and returns its
//! canonical form, and a JSON Schema document for introspection. Input and
//! output are adapted symmetrically.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A value failed validation against an operator schema.
///
/// The message is surfaced verbatim in the `error` field of reply envelopes.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    /// Create a validation error with the given human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type CheckFn = Arc<dyn Fn(Value) -> Result<Value, ValidationError> + Send + Sync>;

/// Validator plus JSON Schema document for one side of an operator contract.
#[derive(Clone)]
pub struct SchemaAdapter {
    document: Value,
    check: CheckFn,
}

impl SchemaAdapter {
    /// Adapt the typed contract `T`.
    ///
    /// Validation deserializes into `T` and serializes back, so the returned
    /// value is the canonical JSON form of the typed value.
    pub fn of<T>() -> Self
    where
        T: Serialize + DeserializeOwned + JsonSchema + 'static,
    {
        let document = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        let check: CheckFn = Arc::new(|value: Value| {
            let typed: T =
                serde_json::from_value(value).map_err(|e| ValidationError::new(e.to_string()))?;
            serde_json::to_value(&typed).map_err(|e| ValidationError::new(e.to_string()))
        });
        Self { document, check }
    }

    /// Build an adapter from an explicit document and validator closure.
    ///
    /// The raw form used where no compiled type exists, e.g. when a
    /// descriptor is assembled dynamically.
    pub fn from_parts(
        document: Value,
        check: impl Fn(Value) -> Result<Value, ValidationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            document,
            check: Arc::new(check),
        }
    }

    /// The JSON Schema document describing accepted values.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Validate `value`, returning its canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when `value` does not conform.
    pub fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        self.check.as_ref()(value)
    }
}

impl fmt::Debug for SchemaAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaAdapter")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}
