#![deny(warnings)]
//! The calculator capability layer for the medcalc runtime.
//!
//! This crate provides the `Calculator` trait every plugin must satisfy,
//! the `CalculatorInputs` accessor wrapper, and the built-in clinical
//! calculators that seed the provider registry.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use medcalc_types::{CalculationOutcome, FieldValue, ValidationReport};
use std::collections::HashMap;

pub mod built_in;
mod provider;

pub use provider::ProviderRegistry;

/// The capability contract every calculator plugin satisfies.
///
/// Calculators are stateless and thread-safe. `calculate` and `validate`
/// are async so the runtime can race them against timeouts; a calculator
/// that blocks without yielding cannot be cancelled, which is the
/// documented cooperative-scheduling limitation.
///
/// The lifecycle hooks (`install`, `uninstall`, `self_check`,
/// `check_compatibility`) default to no-ops; most calculators only
/// implement the calculation members.
#[async_trait]
pub trait Calculator: Send + Sync {
    /// Performs the calculation.
    async fn calculate(&self, inputs: &CalculatorInputs<'_>) -> Result<CalculationOutcome>;

    /// Validates inputs before calculation. Defaults to accepting anything.
    async fn validate(&self, inputs: &CalculatorInputs<'_>) -> ValidationReport {
        let _ = inputs;
        ValidationReport::valid()
    }

    /// Renders a result for display in the given locale.
    fn format_result(&self, outcome: &CalculationOutcome, locale: &str) -> String {
        let mut out = outcome.value.to_string();
        if let Some(unit) = &outcome.unit {
            out.push(' ');
            out.push_str(unit);
        }
        if let Some(interpretation) = &outcome.interpretation {
            if let Some(text) = interpretation.get(locale) {
                out.push_str(" (");
                out.push_str(text);
                out.push(')');
            }
        }
        out
    }

    /// Invoked when the plugin is (re)installed.
    async fn install(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked when the plugin is removed.
    async fn uninstall(&self) -> Result<()> {
        Ok(())
    }

    /// Self-check hook used by the recovery service.
    async fn self_check(&self) -> Result<()> {
        Ok(())
    }

    /// Whether this calculator can run under the given runtime version.
    fn check_compatibility(&self, runtime_version: &str) -> bool {
        let _ = runtime_version;
        true
    }
}

/// Provides a safe interface for calculators to access input variables.
#[derive(Debug)]
pub struct CalculatorInputs<'a> {
    variables: &'a HashMap<String, FieldValue>,
}

impl<'a> CalculatorInputs<'a> {
    /// Creates a new `CalculatorInputs`.
    pub fn new(variables: &'a HashMap<String, FieldValue>) -> Self {
        Self { variables }
    }

    /// Whether an input with this name is present (and non-null).
    pub fn has(&self, name: &str) -> bool {
        matches!(self.variables.get(name), Some(v) if !v.is_null())
    }

    /// Gets a floating-point number value from the inputs.
    pub fn get_f64(&self, name: &str) -> Result<f64> {
        match self.variables.get(name) {
            Some(FieldValue::Float(f)) => Ok(*f),
            Some(FieldValue::Integer(i)) => Ok(*i as f64),
            Some(other) => Err(anyhow!(
                "Input '{}' was found, but it is not a number (got {}).",
                name,
                other.type_name()
            )),
            None => Err(anyhow!("Required input number '{}' was not found.", name)),
        }
    }

    /// Gets a string value from the inputs.
    pub fn get_string(&self, name: &str) -> Result<String> {
        match self.variables.get(name) {
            Some(FieldValue::String(s)) => Ok(s.clone()),
            Some(other) => Err(anyhow!(
                "Input '{}' was found, but it is not a string (got {}).",
                name,
                other.type_name()
            )),
            None => Err(anyhow!("Required input string '{}' was not found.", name)),
        }
    }

    /// Gets a boolean value from the inputs.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.variables.get(name) {
            Some(FieldValue::Boolean(b)) => Ok(*b),
            Some(other) => Err(anyhow!(
                "Input '{}' was found, but it is not a boolean (got {}).",
                name,
                other.type_name()
            )),
            None => Err(anyhow!("Required input boolean '{}' was not found.", name)),
        }
    }

    /// Gets an array value from the inputs.
    pub fn get_array(&self, name: &str) -> Result<&'a Vec<FieldValue>> {
        match self.variables.get(name) {
            Some(FieldValue::Array(arr)) => Ok(arr),
            Some(other) => Err(anyhow!(
                "Input '{}' was found, but it is not an array (got {}).",
                name,
                other.type_name()
            )),
            None => Err(anyhow!("Required input array '{}' was not found.", name)),
        }
    }

    /// Names of all provided inputs, for diagnostics.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }
}
