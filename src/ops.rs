//! Built-in arithmetic operators.
//!
//! The worker binary serves these as its compiled-in catalog under the
//! module path `straylight.ops`. They double as realistic fixtures for the
//! integration tests: `Sum` and `Mul` answer with a single element,
//! `Sequence` streams one element per integer in its range.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::operator::{Descriptor, Emission, Operator, RunError};
use crate::registry::Catalog;

/// Module path the built-in operators are exported under.
pub const MODULE: &str = "straylight.ops";

/// A pair of integers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct Pair {
    /// Left operand; inclusive start for `Sequence`.
    pub a: i64,
    /// Right operand; exclusive end for `Sequence`.
    pub b: i64,
}

/// A single integer result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct Total {
    /// The computed value.
    pub c: i64,
}

/// Adds two integers.
#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl Operator for Sum {
    type Input = Pair;
    type Output = Total;

    fn run(&self, input: Pair) -> Result<Emission<Total>, RunError> {
        Ok(Emission::one(Total {
            c: input.a.wrapping_add(input.b),
        }))
    }
}

/// Multiplies two integers.
#[derive(Debug, Clone, Copy)]
pub struct Mul;

impl Operator for Mul {
    type Input = Pair;
    type Output = Total;

    fn run(&self, input: Pair) -> Result<Emission<Total>, RunError> {
        Ok(Emission::one(Total {
            c: input.a.wrapping_mul(input.b),
        }))
    }
}

/// Streams every integer in `[a, b)` as its own result element.
#[derive(Debug, Clone, Copy)]
pub struct Sequence;

impl Operator for Sequence {
    type Input = Pair;
    type Output = Total;

    fn run(&self, input: Pair) -> Result<Emission<Total>, RunError> {
        Ok(Emission::stream((input.a..input.b).map(|c| Ok(Total { c }))))
    }
}

/// Catalog exposing the built-in operators.
pub fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.register(MODULE, "Sum", Descriptor::new("Sum", Sum));
    catalog.register(MODULE, "Mul", Descriptor::new("Mul", Mul));
    catalog.register(MODULE, "Sequence", Descriptor::new("Sequence", Sequence));
    catalog
}
