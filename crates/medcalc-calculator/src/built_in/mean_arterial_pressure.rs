//! Mean Arterial Pressure
//!
//! Inputs:
//!   * `systolic_mmhg` — systolic blood pressure
//!   * `diastolic_mmhg` — diastolic blood pressure
//!
use crate::{Calculator, CalculatorInputs};
use anyhow::Result;
use async_trait::async_trait;
use medcalc_types::{CalculationOutcome, ValidationReport};

#[derive(Debug, Default)]
pub struct MeanArterialPressureCalculator;

#[async_trait]
impl Calculator for MeanArterialPressureCalculator {
    async fn calculate(&self, inputs: &CalculatorInputs<'_>) -> Result<CalculationOutcome> {
        let systolic = inputs.get_f64("systolic_mmhg")?;
        let diastolic = inputs.get_f64("diastolic_mmhg")?;
        let map = (systolic + 2.0 * diastolic) / 3.0;
        Ok(CalculationOutcome::number(map).with_unit("mmHg"))
    }

    async fn validate(&self, inputs: &CalculatorInputs<'_>) -> ValidationReport {
        let mut report = ValidationReport::valid();
        let systolic = inputs.get_f64("systolic_mmhg");
        let diastolic = inputs.get_f64("diastolic_mmhg");
        match (&systolic, &diastolic) {
            (Ok(s), Ok(d)) if s <= d => {
                report.add_error("systolic_mmhg", "must be greater than diastolic");
            }
            _ => {}
        }
        if let Err(e) = systolic {
            report.add_error("systolic_mmhg", e.to_string());
        }
        if let Err(e) = diastolic {
            report.add_error("diastolic_mmhg", e.to_string());
        }
        report
    }
}
