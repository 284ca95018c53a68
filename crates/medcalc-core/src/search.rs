//! Search, sort and pagination over the plugin catalogue
//!
//! Free-text matching is pluggable (`exact`, `fuzzy`, `semantic`),
//! structural filters AND-combine, and ordering is delegated to a sort
//! strategy. Every stage is deterministic so paginated iteration is stable
//! across calls.

use crate::plugin::CalculatorPlugin;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Free-text matching strategies, selectable by name at query time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategyKind {
    /// Case-sensitive full match on name or id
    Exact,
    /// Case-insensitive substring over name/description/tags/specialty
    #[default]
    Fuzzy,
    /// Synonym-table expansion before fuzzy matching
    Semantic,
}

impl SearchStrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            SearchStrategyKind::Exact => "exact",
            SearchStrategyKind::Fuzzy => "fuzzy",
            SearchStrategyKind::Semantic => "semantic",
        }
    }
}

/// Result ordering strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortStrategyKind {
    /// Alphabetical by localized display name
    #[default]
    Name,
    /// Best text-match score first; requires the active query text
    Relevance,
    /// Deterministic blend of evidence level and update recency
    Popularity,
}

/// A composed registry search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub strategy: SearchStrategyKind,
    pub category: Option<String>,
    pub specialty: Option<String>,
    pub tags: Vec<String>,
    pub difficulty: Option<String>,
    pub evidence_level: Option<String>,
    pub sort: SortStrategyKind,
    pub limit: Option<usize>,
    pub page: usize,
    pub locale: Option<String>,
}

impl SearchQuery {
    fn locale(&self) -> &str {
        self.locale.as_deref().unwrap_or("en")
    }
}

/// Scores a plugin against free text; zero means no match
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn score(&self, plugin: &CalculatorPlugin, text: &str) -> f64;
}

struct ExactMatch;

impl SearchStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn score(&self, plugin: &CalculatorPlugin, text: &str) -> f64 {
        if plugin.metadata.id == text || plugin.key() == text {
            return 1.0;
        }
        let name_hit = plugin
            .metadata
            .name
            .locales()
            .any(|locale| plugin.metadata.name.get(locale) == Some(text));
        if name_hit { 1.0 } else { 0.0 }
    }
}

struct FuzzyMatch;

impl FuzzyMatch {
    fn score_needle(plugin: &CalculatorPlugin, needle: &str) -> f64 {
        let mut score = 0.0;
        if plugin.metadata.id.contains(needle) {
            score += 5.0;
        }
        let name_hit = plugin
            .metadata
            .name
            .locales()
            .filter_map(|locale| plugin.metadata.name.get(locale))
            .any(|name| name.to_lowercase().contains(needle));
        if name_hit {
            score += 3.0;
        }
        let tag_hit = plugin.metadata.tags.iter().any(|tag| tag.to_lowercase().contains(needle));
        if tag_hit {
            score += 2.0;
        }
        if let Some(specialty) = &plugin.config.specialty {
            if specialty.to_lowercase().contains(needle) {
                score += 1.5;
            }
        }
        let description_hit = plugin
            .metadata
            .description
            .locales()
            .filter_map(|locale| plugin.metadata.description.get(locale))
            .any(|text| text.to_lowercase().contains(needle));
        if description_hit {
            score += 1.0;
        }
        score
    }
}

impl SearchStrategy for FuzzyMatch {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn score(&self, plugin: &CalculatorPlugin, text: &str) -> f64 {
        Self::score_needle(plugin, &text.to_lowercase())
    }
}

/// Clinical synonym pairs used by the semantic strategy. Matching is
/// bidirectional: a query containing either side also tries the other.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("heart", &["cardiac", "cardiology", "cardiovascular"]),
    ("kidney", &["renal", "nephrology"]),
    ("bmi", &["body mass index"]),
    ("blood pressure", &["hypertension", "arterial pressure"]),
    ("sugar", &["glucose", "diabetes"]),
    ("stroke", &["cerebrovascular"]),
    ("weight", &["obesity", "anthropometric"]),
];

fn expand_text(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut expansions = vec![lower.clone()];
    for (term, synonyms) in SYNONYMS {
        if lower.contains(term) {
            expansions.extend(synonyms.iter().map(|s| lower.replace(term, s)));
        }
        for synonym in *synonyms {
            if lower.contains(synonym) {
                expansions.push(lower.replace(synonym, term));
            }
        }
    }
    expansions.dedup();
    expansions
}

struct SemanticMatch;

impl SearchStrategy for SemanticMatch {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn score(&self, plugin: &CalculatorPlugin, text: &str) -> f64 {
        expand_text(text)
            .iter()
            .map(|needle| FuzzyMatch::score_needle(plugin, needle))
            .fold(0.0, f64::max)
    }
}

/// Strategy factory
pub fn strategy_for(kind: SearchStrategyKind) -> &'static dyn SearchStrategy {
    match kind {
        SearchStrategyKind::Exact => &ExactMatch,
        SearchStrategyKind::Fuzzy => &FuzzyMatch,
        SearchStrategyKind::Semantic => &SemanticMatch,
    }
}

/// AND-combined structural filter predicate
fn matches_filters(plugin: &CalculatorPlugin, query: &SearchQuery) -> bool {
    if let Some(category) = &query.category {
        if !plugin.config.category.eq_ignore_ascii_case(category) {
            return false;
        }
    }
    if let Some(specialty) = &query.specialty {
        match &plugin.config.specialty {
            Some(own) if own.eq_ignore_ascii_case(specialty) => {}
            _ => return false,
        }
    }
    for wanted in &query.tags {
        let has = plugin.metadata.tags.iter().any(|tag| tag.eq_ignore_ascii_case(wanted));
        if !has {
            return false;
        }
    }
    if let Some(difficulty) = &query.difficulty {
        match &plugin.config.difficulty {
            Some(own) if own.eq_ignore_ascii_case(difficulty) => {}
            _ => return false,
        }
    }
    if let Some(level) = &query.evidence_level {
        match &plugin.config.evidence_level {
            Some(own) if own.eq_ignore_ascii_case(level) => {}
            _ => return false,
        }
    }
    true
}

/// Rank for the popularity blend; unknown levels rank lowest
fn evidence_rank(plugin: &CalculatorPlugin) -> u8 {
    match plugin.config.evidence_level.as_deref().map(|s| s.to_lowercase()) {
        Some(level) if level == "a" || level == "high" => 3,
        Some(level) if level == "b" || level == "moderate" => 2,
        Some(level) if level == "c" || level == "low" => 1,
        _ => 0,
    }
}

fn sort_results(results: &mut [(Arc<CalculatorPlugin>, f64)], query: &SearchQuery) {
    let locale = query.locale().to_string();
    match query.sort {
        SortStrategyKind::Name => {
            results.sort_by(|(a, _), (b, _)| {
                a.display_name(&locale)
                    .cmp(b.display_name(&locale))
                    .then_with(|| a.key().cmp(&b.key()))
            });
        }
        SortStrategyKind::Relevance => {
            results.sort_by(|(a, score_a), (b, score_b)| {
                score_b
                    .partial_cmp(score_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.key().cmp(&b.key()))
            });
        }
        SortStrategyKind::Popularity => {
            results.sort_by(|(a, _), (b, _)| {
                evidence_rank(b)
                    .cmp(&evidence_rank(a))
                    .then_with(|| b.metadata.updated_at.cmp(&a.metadata.updated_at))
                    .then_with(|| a.key().cmp(&b.key()))
            });
        }
    }
}

fn paginate<T>(results: Vec<T>, limit: Option<usize>, page: usize) -> Vec<T> {
    match limit {
        Some(limit) => results.into_iter().skip(page.saturating_mul(limit)).take(limit).collect(),
        None => results,
    }
}

/// Run the full search pipeline over a catalogue snapshot
pub fn run_search(
    plugins: Vec<Arc<CalculatorPlugin>>,
    query: &SearchQuery,
) -> Vec<Arc<CalculatorPlugin>> {
    let strategy = strategy_for(query.strategy);

    let mut scored: Vec<(Arc<CalculatorPlugin>, f64)> = plugins
        .into_iter()
        .filter_map(|plugin| match &query.text {
            Some(text) if !text.is_empty() => {
                let score = strategy.score(&plugin, text);
                if score > 0.0 { Some((plugin, score)) } else { None }
            }
            _ => Some((plugin, 0.0)),
        })
        .filter(|(plugin, _)| matches_filters(plugin, query))
        .collect();

    sort_results(&mut scored, query);
    paginate(scored.into_iter().map(|(plugin, _)| plugin).collect(), query.limit, query.page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginConfig, PluginMetadata};
    use medcalc_calculator::built_in::bmi::BmiCalculator;
    use medcalc_types::LocalizedText;

    fn plugin(id: &str, namespace: &str, name: &str, tags: &[&str]) -> Arc<CalculatorPlugin> {
        Arc::new(CalculatorPlugin::new(
            PluginMetadata {
                id: id.to_string(),
                namespace: namespace.to_string(),
                version: "1.0.0".to_string(),
                name: LocalizedText::with("en", name),
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
                category: namespace.to_string(),
                specialty: Some(namespace.to_string()),
                ..Default::default()
            },
            Arc::new(BmiCalculator),
        ))
    }

    #[test]
    fn exact_strategy_requires_full_match() {
        let bmi = plugin("bmi", "general", "Body Mass Index", &[]);
        let exact = strategy_for(SearchStrategyKind::Exact);
        assert!(exact.score(&bmi, "bmi") > 0.0);
        assert!(exact.score(&bmi, "Body Mass Index") > 0.0);
        assert!(exact.score(&bmi, "body mass") == 0.0);
        assert!(exact.score(&bmi, "BMI") == 0.0);
    }

    #[test]
    fn fuzzy_strategy_is_case_insensitive_substring() {
        let bmi = plugin("bmi", "general", "Body Mass Index", &["obesity"]);
        let fuzzy = strategy_for(SearchStrategyKind::Fuzzy);
        assert!(fuzzy.score(&bmi, "MASS") > 0.0);
        assert!(fuzzy.score(&bmi, "obes") > 0.0);
        assert!(fuzzy.score(&bmi, "renal") == 0.0);
    }

    #[test]
    fn semantic_strategy_expands_synonyms() {
        let map = plugin("map", "cardiology", "Mean Arterial Pressure", &[]);
        let semantic = strategy_for(SearchStrategyKind::Semantic);
        // "heart" expands to "cardiology", matching the specialty
        assert!(semantic.score(&map, "heart") > 0.0);
        assert!(strategy_for(SearchStrategyKind::Fuzzy).score(&map, "heart") == 0.0);
    }

    #[test]
    fn pagination_is_disjoint_and_covering() {
        let plugins = vec![
            plugin("a", "general", "Alpha", &[]),
            plugin("b", "general", "Beta", &[]),
            plugin("c", "general", "Gamma", &[]),
        ];
        let all = run_search(plugins.clone(), &SearchQuery::default());
        assert_eq!(all.len(), 3);

        let mut paged = Vec::new();
        for page in 0..3 {
            let query = SearchQuery { limit: Some(1), page, ..Default::default() };
            paged.extend(run_search(plugins.clone(), &query));
        }
        let keys: Vec<String> = paged.iter().map(|p| p.key()).collect();
        let all_keys: Vec<String> = all.iter().map(|p| p.key()).collect();
        assert_eq!(keys, all_keys);
    }

    #[test]
    fn popularity_sort_blends_evidence_and_recency() {
        let mut weak = plugin("weak", "general", "Weak", &[]);
        let mut strong = plugin("strong", "general", "Strong", &[]);
        Arc::get_mut(&mut weak).unwrap().config.evidence_level = Some("C".to_string());
        Arc::get_mut(&mut strong).unwrap().config.evidence_level = Some("A".to_string());

        let query = SearchQuery { sort: SortStrategyKind::Popularity, ..Default::default() };
        let results = run_search(vec![weak, strong], &query);
        assert_eq!(results[0].metadata.id, "strong");
    }
}
