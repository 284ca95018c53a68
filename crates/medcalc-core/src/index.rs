//! Index strategies for registry lookup tables
//!
//! Each strategy derives bucket keys from a plugin; the registry rebuilds
//! every index from scratch on mutation rather than patching incrementally,
//! so a bucket can never reference a plugin missing from the primary map.

use crate::plugin::CalculatorPlugin;
use ahash::AHashMap;
use std::sync::Arc;

/// Kinds of derived lookup tables the registry maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Category,
    Tag,
    Specialty,
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Category => "category",
            IndexKind::Tag => "tag",
            IndexKind::Specialty => "specialty",
        }
    }

    pub fn all() -> [IndexKind; 3] {
        [IndexKind::Category, IndexKind::Tag, IndexKind::Specialty]
    }
}

/// Derives index bucket keys from a plugin
pub trait IndexStrategy: Send + Sync {
    fn kind(&self) -> IndexKind;

    /// Bucket keys this plugin belongs to (may be empty)
    fn keys_for(&self, plugin: &CalculatorPlugin) -> Vec<String>;
}

struct CategoryIndex;

impl IndexStrategy for CategoryIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Category
    }

    fn keys_for(&self, plugin: &CalculatorPlugin) -> Vec<String> {
        vec![plugin.config.category.clone()]
    }
}

struct TagIndex;

impl IndexStrategy for TagIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Tag
    }

    fn keys_for(&self, plugin: &CalculatorPlugin) -> Vec<String> {
        plugin.metadata.tags.iter().map(|t| t.to_lowercase()).collect()
    }
}

struct SpecialtyIndex;

impl IndexStrategy for SpecialtyIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Specialty
    }

    fn keys_for(&self, plugin: &CalculatorPlugin) -> Vec<String> {
        plugin.config.specialty.iter().map(|s| s.to_lowercase()).collect()
    }
}

/// Strategy factory, extensible by adding kinds here
pub fn strategy_for(kind: IndexKind) -> Box<dyn IndexStrategy> {
    match kind {
        IndexKind::Category => Box::new(CategoryIndex),
        IndexKind::Tag => Box::new(TagIndex),
        IndexKind::Specialty => Box::new(SpecialtyIndex),
    }
}

/// Build one index over a plugin snapshot. Bucket members are sorted for
/// deterministic iteration.
pub fn build_index(
    strategy: &dyn IndexStrategy,
    plugins: &[Arc<CalculatorPlugin>],
) -> AHashMap<String, Vec<String>> {
    let mut index: AHashMap<String, Vec<String>> = AHashMap::new();
    for plugin in plugins {
        for bucket in strategy.keys_for(plugin) {
            index.entry(bucket).or_default().push(plugin.key());
        }
    }
    for members in index.values_mut() {
        members.sort();
        members.dedup();
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginConfig, PluginMetadata};
    use medcalc_calculator::built_in::bmi::BmiCalculator;
    use medcalc_types::LocalizedText;

    fn plugin(id: &str, namespace: &str, category: &str, tags: &[&str]) -> Arc<CalculatorPlugin> {
        Arc::new(CalculatorPlugin::new(
            PluginMetadata {
                id: id.to_string(),
                namespace: namespace.to_string(),
                version: "1.0.0".to_string(),
                name: LocalizedText::with("en", id),
                description: LocalizedText::new(),
                author: String::new(),
                license: None,
                dependencies: vec![],
                conflicts: vec![],
                tags: tags.iter().map(|t| t.to_string()).collect(),
                created_at: None,
                updated_at: None,
            },
            PluginConfig {
                entry: "bmi".to_string(),
                category: category.to_string(),
                ..Default::default()
            },
            std::sync::Arc::new(BmiCalculator),
        ))
    }

    #[test]
    fn category_index_buckets_by_config_category() {
        let plugins =
            vec![plugin("bmi", "general", "general", &[]), plugin("map", "cardio", "cardiology", &[])];
        let index = build_index(strategy_for(IndexKind::Category).as_ref(), &plugins);
        assert_eq!(index.get("general").unwrap(), &vec!["general.bmi".to_string()]);
        assert_eq!(index.get("cardiology").unwrap(), &vec!["cardio.map".to_string()]);
    }

    #[test]
    fn tag_index_lowercases_and_dedupes() {
        let plugins = vec![plugin("bmi", "general", "general", &["Obesity", "obesity", "screening"])];
        let index = build_index(strategy_for(IndexKind::Tag).as_ref(), &plugins);
        assert_eq!(index.get("obesity").unwrap().len(), 1);
        assert!(index.contains_key("screening"));
    }
}
