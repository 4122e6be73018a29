//! The operator abstraction.
//!
//! An operator is a named compute unit with a schema-described input and
//! output and a run function producing zero or more output values per
//! request. Typed operators implement [`Operator`]; [`Descriptor`] is the
//! erased record the registry and dispatcher work with. A descriptor missing
//! any of its three parts (input schema, output schema, run function) is
//! abstract: it is rejected at registration and refuses invocation.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::schema::{SchemaAdapter, ValidationError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error raised by an operator's run function.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RunError(String);

impl RunError {
    /// Create a run error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure while invoking an operator through its descriptor.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The request or a produced element failed schema validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The operator's run function failed.
    #[error("{0}")]
    Run(#[from] RunError),

    /// The descriptor is abstract and cannot be invoked.
    #[error("can not call abstract operator {0}")]
    Abstract(String),
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// The output of one run: a single element or a lazy sequence of elements.
///
/// Streamed elements are published one at a time, each pulled only after the
/// previous reply went out.
pub enum Emission<T> {
    /// Exactly one output element.
    One(T),
    /// A lazy sequence of output elements.
    Stream(Box<dyn Iterator<Item = Result<T, RunError>> + Send>),
}

impl<T> Emission<T>
where
    T: Serialize + Send + 'static,
{
    /// Emit a single element.
    pub fn one(value: T) -> Self {
        Self::One(value)
    }

    /// Emit each element of `iter` in order.
    pub fn stream<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Result<T, RunError>>,
        I::IntoIter: Send + 'static,
    {
        Self::Stream(Box::new(iter.into_iter()))
    }

    fn erase(self) -> ErasedEmission {
        fn to_value<T: Serialize>(value: T) -> Result<Value, RunError> {
            serde_json::to_value(value).map_err(|e| RunError::new(e.to_string()))
        }
        match self {
            Self::One(value) => Box::new(std::iter::once(to_value(value))),
            Self::Stream(iter) => Box::new(iter.map(|item| item.and_then(to_value))),
        }
    }
}

impl<T> fmt::Debug for Emission<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(_) => f.write_str("Emission::One"),
            Self::Stream(_) => f.write_str("Emission::Stream"),
        }
    }
}

/// Erased output sequence over canonical JSON values.
pub type ErasedEmission = Box<dyn Iterator<Item = Result<Value, RunError>> + Send>;

/// Erased run function over canonical JSON values.
pub type RunFn = Arc<dyn Fn(Value) -> Result<ErasedEmission, RunError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Operator trait
// ---------------------------------------------------------------------------

/// A typed compute unit exposed as a queue endpoint.
///
/// `Input` and `Output` double as the wire contract and the JSON Schema
/// source for introspection.
pub trait Operator: Send + Sync + 'static {
    /// Request payload, validated before `run` is invoked.
    type Input: Serialize + DeserializeOwned + JsonSchema + Send + 'static;

    /// Result element; every produced value is validated against it.
    type Output: Serialize + DeserializeOwned + JsonSchema + Send + 'static;

    /// Produce zero or more output elements for one validated input.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when the computation fails; the message becomes
    /// the `error` field of the reply envelope.
    fn run(&self, input: Self::Input) -> Result<Emission<Self::Output>, RunError>;
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Erased operator record: input and output schemas plus the run function.
#[derive(Clone)]
pub struct Descriptor {
    name: String,
    input: Option<SchemaAdapter>,
    output: Option<SchemaAdapter>,
    run: Option<RunFn>,
}

impl Descriptor {
    /// Erase a typed operator into a concrete descriptor.
    pub fn new<O: Operator>(name: impl Into<String>, operator: O) -> Self {
        let operator = Arc::new(operator);
        let run: RunFn = Arc::new(move |input: Value| {
            let typed: O::Input =
                serde_json::from_value(input).map_err(|e| RunError::new(e.to_string()))?;
            Ok(operator.run(typed)?.erase())
        });
        Self {
            name: name.into(),
            input: Some(SchemaAdapter::of::<O::Input>()),
            output: Some(SchemaAdapter::of::<O::Output>()),
            run: Some(run),
        }
    }

    /// Start building a descriptor from raw parts.
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            name: name.into(),
            input: None,
            output: None,
            run: None,
        }
    }

    /// Operator name, used as the queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when input, output, or run is missing.
    pub fn is_abstract(&self) -> bool {
        self.input.is_none() || self.output.is_none() || self.run.is_none()
    }

    /// JSON Schema of the input contract, if declared.
    pub fn input_schema(&self) -> Option<&Value> {
        self.input.as_ref().map(SchemaAdapter::document)
    }

    /// JSON Schema of the output contract, if declared.
    pub fn output_schema(&self) -> Option<&Value> {
        self.output.as_ref().map(SchemaAdapter::document)
    }

    /// Validate `request` and invoke the run function.
    ///
    /// Returns the lazy output sequence; each element is validated against
    /// the output schema as it is pulled.
    ///
    /// # Errors
    ///
    /// Fails up front when the descriptor is abstract, the request does not
    /// match the input schema, or the run function fails to start.
    pub fn call(&self, request: Value) -> Result<CallStream, OperatorError> {
        let (Some(input), Some(output), Some(run)) = (&self.input, &self.output, &self.run) else {
            return Err(OperatorError::Abstract(self.name.clone()));
        };
        let canonical = input.validate(request)?;
        let elements = run.as_ref()(canonical)?;
        Ok(CallStream {
            elements,
            output: output.clone(),
        })
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("is_abstract", &self.is_abstract())
            .finish_non_exhaustive()
    }
}

/// Builder assembling a [`Descriptor`] from raw, untyped parts.
///
/// `build` always succeeds; the result is abstract when parts are missing.
pub struct DescriptorBuilder {
    name: String,
    input: Option<SchemaAdapter>,
    output: Option<SchemaAdapter>,
    run: Option<RunFn>,
}

impl DescriptorBuilder {
    /// Set the input schema adapter.
    pub fn input(mut self, adapter: SchemaAdapter) -> Self {
        self.input = Some(adapter);
        self
    }

    /// Set the output schema adapter.
    pub fn output(mut self, adapter: SchemaAdapter) -> Self {
        self.output = Some(adapter);
        self
    }

    /// Set the run function.
    pub fn run(
        mut self,
        run: impl Fn(Value) -> Result<ErasedEmission, RunError> + Send + Sync + 'static,
    ) -> Self {
        self.run = Some(Arc::new(run));
        self
    }

    /// Finish building.
    pub fn build(self) -> Descriptor {
        Descriptor {
            name: self.name,
            input: self.input,
            output: self.output,
            run: self.run,
        }
    }
}

// ---------------------------------------------------------------------------
// CallStream
// ---------------------------------------------------------------------------

/// Lazily validated sequence of output elements from one invocation.
pub struct CallStream {
    elements: ErasedEmission,
    output: SchemaAdapter,
}

impl Iterator for CallStream {
    type Item = Result<Value, OperatorError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.elements.next()?;
        Some(match item {
            Ok(value) => self.output.validate(value).map_err(OperatorError::from),
            Err(error) => Err(OperatorError::from(error)),
        })
    }
}
