//! Built-in clinical calculators shipped with the runtime.

// Anthropometric calculators
pub mod bmi;
pub mod bsa;

// Renal function
pub mod egfr;

// Cardiovascular
pub mod mean_arterial_pressure;

// Electrolytes
pub mod corrected_calcium;
