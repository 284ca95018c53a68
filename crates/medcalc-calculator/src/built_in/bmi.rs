//! Body Mass Index
//!
//! Inputs:
//!   * `weight_kg` — body weight in kilograms
//!   * `height_cm` — body height in centimetres
//!
use crate::{Calculator, CalculatorInputs};
use anyhow::Result;
use async_trait::async_trait;
use medcalc_types::{CalculationOutcome, LocalizedText, ValidationReport};

#[derive(Debug, Default)]
pub struct BmiCalculator;

fn interpretation(bmi: f64) -> LocalizedText {
    let label = if bmi < 18.5 {
        "underweight"
    } else if bmi < 25.0 {
        "normal weight"
    } else if bmi < 30.0 {
        "overweight"
    } else {
        "obesity"
    };
    LocalizedText::with("en", label)
}

#[async_trait]
impl Calculator for BmiCalculator {
    async fn calculate(&self, inputs: &CalculatorInputs<'_>) -> Result<CalculationOutcome> {
        let weight = inputs.get_f64("weight_kg")?;
        let height_m = inputs.get_f64("height_cm")? / 100.0;
        let bmi = weight / (height_m * height_m);
        Ok(CalculationOutcome::number(bmi)
            .with_unit("kg/m²")
            .with_interpretation(interpretation(bmi)))
    }

    async fn validate(&self, inputs: &CalculatorInputs<'_>) -> ValidationReport {
        let mut report = ValidationReport::valid();
        match inputs.get_f64("weight_kg") {
            Ok(w) if !(1.0..=500.0).contains(&w) => {
                report.add_error("weight_kg", "must be between 1 and 500 kg");
            }
            Err(e) => report.add_error("weight_kg", e.to_string()),
            _ => {}
        }
        match inputs.get_f64("height_cm") {
            Ok(h) if !(30.0..=280.0).contains(&h) => {
                report.add_error("height_cm", "must be between 30 and 280 cm");
            }
            Err(e) => report.add_error("height_cm", e.to_string()),
            _ => {}
        }
        report
    }
}
