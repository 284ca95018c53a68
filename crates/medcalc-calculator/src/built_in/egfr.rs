//! Estimated creatinine clearance (Cockcroft-Gault)
//!
//! Inputs:
//!   * `age_years` — patient age in years
//!   * `weight_kg` — body weight in kilograms
//!   * `creatinine_mg_dl` — serum creatinine in mg/dL
//!   * `female` — biological sex flag applying the 0.85 correction
//!
use crate::{Calculator, CalculatorInputs};
use anyhow::Result;
use async_trait::async_trait;
use medcalc_types::{CalculationOutcome, ValidationReport};

#[derive(Debug, Default)]
pub struct EgfrCalculator;

#[async_trait]
impl Calculator for EgfrCalculator {
    async fn calculate(&self, inputs: &CalculatorInputs<'_>) -> Result<CalculationOutcome> {
        let age = inputs.get_f64("age_years")?;
        let weight = inputs.get_f64("weight_kg")?;
        let creatinine = inputs.get_f64("creatinine_mg_dl")?;
        let female = inputs.get_bool("female").unwrap_or(false);

        let mut clearance = ((140.0 - age) * weight) / (72.0 * creatinine);
        if female {
            clearance *= 0.85;
        }
        Ok(CalculationOutcome::number(clearance).with_unit("mL/min"))
    }

    async fn validate(&self, inputs: &CalculatorInputs<'_>) -> ValidationReport {
        let mut report = ValidationReport::valid();
        match inputs.get_f64("age_years") {
            Ok(a) if !(18.0..=120.0).contains(&a) => {
                report.add_error("age_years", "must be between 18 and 120 years");
            }
            Err(e) => report.add_error("age_years", e.to_string()),
            _ => {}
        }
        match inputs.get_f64("creatinine_mg_dl") {
            Ok(c) if c <= 0.0 => {
                report.add_error("creatinine_mg_dl", "must be positive");
            }
            Err(e) => report.add_error("creatinine_mg_dl", e.to_string()),
            _ => {}
        }
        if let Err(e) = inputs.get_f64("weight_kg") {
            report.add_error("weight_kg", e.to_string());
        }
        report
    }
}
