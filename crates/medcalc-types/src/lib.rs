//! Medcalc Types
//!
//! This crate defines the types shared across the medcalc ecosystem
//! (`medcalc-calculator` and `medcalc-core`): the `FieldValue` input/output
//! value type, localized display text, and the calculation result shapes.
//! Keeping them here eliminates circular dependencies between crates.

#![deny(warnings)]

mod types;

pub use types::{
    CalculationOutcome, FieldError, FieldValue, LocalizedText, ValidationReport,
};
