//! Body Surface Area (Mosteller)
//!
//! Inputs:
//!   * `weight_kg` — body weight in kilograms
//!   * `height_cm` — body height in centimetres
//!
use crate::{Calculator, CalculatorInputs};
use anyhow::Result;
use async_trait::async_trait;
use medcalc_types::{CalculationOutcome, ValidationReport};

#[derive(Debug, Default)]
pub struct BsaCalculator;

#[async_trait]
impl Calculator for BsaCalculator {
    async fn calculate(&self, inputs: &CalculatorInputs<'_>) -> Result<CalculationOutcome> {
        let weight = inputs.get_f64("weight_kg")?;
        let height = inputs.get_f64("height_cm")?;
        let bsa = (weight * height / 3600.0).sqrt();
        Ok(CalculationOutcome::number(bsa).with_unit("m²"))
    }

    async fn validate(&self, inputs: &CalculatorInputs<'_>) -> ValidationReport {
        let mut report = ValidationReport::valid();
        for (field, max) in [("weight_kg", 500.0), ("height_cm", 280.0)] {
            match inputs.get_f64(field) {
                Ok(v) if v <= 0.0 || v > max => {
                    report.add_error(field, format!("must be between 0 and {max}"));
                }
                Err(e) => report.add_error(field, e.to_string()),
                _ => {}
            }
        }
        report
    }
}
