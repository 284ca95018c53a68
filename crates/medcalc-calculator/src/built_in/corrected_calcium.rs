//! Albumin-corrected calcium
//!
//! Inputs:
//!   * `calcium_mg_dl` — measured total serum calcium in mg/dL
//!   * `albumin_g_dl` — serum albumin in g/dL
//!
use crate::{Calculator, CalculatorInputs};
use anyhow::Result;
use async_trait::async_trait;
use medcalc_types::{CalculationOutcome, ValidationReport};

#[derive(Debug, Default)]
pub struct CorrectedCalciumCalculator;

#[async_trait]
impl Calculator for CorrectedCalciumCalculator {
    async fn calculate(&self, inputs: &CalculatorInputs<'_>) -> Result<CalculationOutcome> {
        let calcium = inputs.get_f64("calcium_mg_dl")?;
        let albumin = inputs.get_f64("albumin_g_dl")?;
        let corrected = calcium + 0.8 * (4.0 - albumin);
        Ok(CalculationOutcome::number(corrected).with_unit("mg/dL"))
    }

    async fn validate(&self, inputs: &CalculatorInputs<'_>) -> ValidationReport {
        let mut report = ValidationReport::valid();
        for field in ["calcium_mg_dl", "albumin_g_dl"] {
            match inputs.get_f64(field) {
                Ok(v) if v <= 0.0 => report.add_error(field, "must be positive"),
                Err(e) => report.add_error(field, e.to_string()),
                _ => {}
            }
        }
        report
    }
}
