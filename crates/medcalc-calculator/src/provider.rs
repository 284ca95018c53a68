use crate::Calculator;
use crate::built_in::{
    bmi::BmiCalculator, bsa::BsaCalculator, corrected_calcium::CorrectedCalciumCalculator,
    egfr::EgfrCalculator, mean_arterial_pressure::MeanArterialPressureCalculator,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps config `entry` names to calculator implementations.
///
/// Plugin config documents name their calculation capability through an
/// `entry` field; discovery resolves that name here. The registry is
/// seeded with the built-in clinical calculators and hosts can register
/// additional entries before discovery runs.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Calculator>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_built_ins()
    }
}

impl ProviderRegistry {
    /// An empty registry with no entries.
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    /// A registry pre-populated with the built-in calculators.
    pub fn with_built_ins() -> Self {
        let mut registry = Self::new();
        registry.register("bmi", Arc::new(BmiCalculator));
        registry.register("bsa", Arc::new(BsaCalculator));
        registry.register("egfr", Arc::new(EgfrCalculator));
        registry.register(
            "mean_arterial_pressure",
            Arc::new(MeanArterialPressureCalculator),
        );
        registry.register("corrected_calcium", Arc::new(CorrectedCalciumCalculator));
        registry
    }

    /// Register a calculator under an entry name. Later registrations
    /// replace earlier ones.
    pub fn register(&mut self, entry: &str, calculator: Arc<dyn Calculator>) {
        self.providers.insert(entry.to_string(), calculator);
    }

    pub fn get(&self, entry: &str) -> Option<Arc<dyn Calculator>> {
        self.providers.get(entry).cloned()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.providers.contains_key(entry)
    }

    /// List registered entry names.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
