use medcalc_calculator::built_in::bmi::BmiCalculator;
use medcalc_core::{
    CalculatorRegistry, PluginError, RegistryConfig, SearchQuery, SearchStrategyKind,
    SortStrategyKind,
};
use medcalc_core::plugin::{CalculatorPlugin, PluginConfig, PluginMetadata};
use medcalc_core::registry::Health;
use medcalc_types::LocalizedText;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn plugin(
    namespace: &str,
    id: &str,
    version: &str,
    category: &str,
    tags: &[&str],
) -> Arc<CalculatorPlugin> {
    Arc::new(CalculatorPlugin::new(
        PluginMetadata {
            id: id.to_string(),
            namespace: namespace.to_string(),
            version: version.to_string(),
            name: LocalizedText::with("en", &format!("{id} calculator")),
            description: LocalizedText::new(),
            author: "tests".to_string(),
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
            specialty: Some(category.to_string()),
            ..Default::default()
        },
        Arc::new(BmiCalculator),
    ))
}

#[test]
fn registering_the_same_key_twice_conflicts_with_existing_version() {
    let registry = CalculatorRegistry::default();
    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();

    let error = registry
        .register(plugin("general", "bmi", "1.0.0", "general", &[]))
        .unwrap_err();
    match &error {
        PluginError::Conflict { existing_version, .. } => {
            assert_eq!(existing_version.as_deref(), Some("1.0.0"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(error.to_string().contains("general.bmi"));
}

#[test]
fn higher_version_replaces_lower_version_rejects() {
    let registry = CalculatorRegistry::default();
    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();

    registry.register(plugin("general", "bmi", "1.1.0", "general", &[])).unwrap();
    assert_eq!(registry.get("general.bmi").unwrap().metadata.version, "1.1.0");

    assert!(registry.register(plugin("general", "bmi", "1.0.5", "general", &[])).is_err());
    assert_eq!(registry.get("general.bmi").unwrap().metadata.version, "1.1.0");
}

#[test]
fn empty_search_returns_every_registered_plugin() {
    let registry = CalculatorRegistry::default();
    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();
    registry.register(plugin("cardiology", "map", "1.0.0", "cardiology", &[])).unwrap();

    let results = registry.search(&SearchQuery::default());
    assert_eq!(results.len(), 2);
}

#[test]
fn category_filter_selects_exactly_matching_plugins() {
    let registry = CalculatorRegistry::default();
    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();
    registry.register(plugin("cardiology", "map", "1.0.0", "cardiology", &[])).unwrap();

    let query = SearchQuery { category: Some("cardiology".to_string()), ..Default::default() };
    let results = registry.search(&query);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].key(), "cardiology.map");
}

#[test]
fn pagination_is_disjoint_and_covers_the_filtered_set() {
    let registry = CalculatorRegistry::default();
    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();
    registry.register(plugin("cardiology", "map", "1.0.0", "cardiology", &[])).unwrap();

    let page0 = registry
        .search(&SearchQuery { limit: Some(1), page: 0, ..Default::default() });
    let page1 = registry
        .search(&SearchQuery { limit: Some(1), page: 1, ..Default::default() });
    assert_eq!(page0.len(), 1);
    assert_eq!(page1.len(), 1);
    assert_ne!(page0[0].key(), page1[0].key());

    let mut union: Vec<String> =
        page0.iter().chain(page1.iter()).map(|p| p.key()).collect();
    union.sort();
    let mut all: Vec<String> =
        registry.search(&SearchQuery::default()).iter().map(|p| p.key()).collect();
    all.sort();
    assert_eq!(union, all);
}

#[test]
fn text_search_strategies_compose_with_filters() {
    let registry = CalculatorRegistry::default();
    registry
        .register(plugin("general", "bmi", "1.0.0", "general", &["obesity"]))
        .unwrap();
    registry
        .register(plugin("cardiology", "map", "1.0.0", "cardiology", &["pressure"]))
        .unwrap();

    // Semantic: "heart" reaches the cardiology specialty via synonyms.
    let query = SearchQuery {
        text: Some("heart".to_string()),
        strategy: SearchStrategyKind::Semantic,
        sort: SortStrategyKind::Relevance,
        ..Default::default()
    };
    let results = registry.search(&query);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].key(), "cardiology.map");

    // The same text with a category filter that cannot match yields nothing.
    let query = SearchQuery {
        text: Some("heart".to_string()),
        strategy: SearchStrategyKind::Semantic,
        category: Some("general".to_string()),
        ..Default::default()
    };
    assert!(registry.search(&query).is_empty());
}

#[test]
fn events_are_delivered_to_observers() {
    let registry = CalculatorRegistry::default();
    let added = Arc::new(AtomicUsize::new(0));
    let searches = Arc::new(AtomicUsize::new(0));

    let added_clone = added.clone();
    let searches_clone = searches.clone();
    let _subscription = registry
        .subscribe(Arc::new(move |event| match event.kind() {
            "calculator_added" => {
                added_clone.fetch_add(1, Ordering::SeqCst);
            }
            "search_performed" => {
                searches_clone.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }))
        .unwrap();

    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();
    registry.search(&SearchQuery::default());

    assert_eq!(added.load(Ordering::SeqCst), 1);
    assert_eq!(searches.load(Ordering::SeqCst), 1);
}

#[test]
fn observer_capacity_is_bounded() {
    let registry = CalculatorRegistry::new(RegistryConfig {
        max_observers: 2,
        ..Default::default()
    });
    let _a = registry.subscribe(Arc::new(|_| {})).unwrap();
    let _b = registry.subscribe(Arc::new(|_| {})).unwrap();
    assert!(registry.subscribe(Arc::new(|_| {})).is_err());

    drop(_a);
    assert!(registry.subscribe(Arc::new(|_| {})).is_ok());
}

#[test]
fn one_panicking_observer_does_not_starve_the_rest() {
    let registry = CalculatorRegistry::default();
    let _bad = registry.subscribe(Arc::new(|_| panic!("observer bug"))).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    let _good = registry
        .subscribe(Arc::new(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();
    assert!(seen.load(Ordering::SeqCst) > 0);
}

#[test]
fn health_reflects_registry_population() {
    let registry = CalculatorRegistry::default();
    let health = registry.get_health_status();
    assert_eq!(health.status, Health::Unhealthy);
    assert!(!health.issues.is_empty());

    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();
    assert_eq!(registry.get_health_status().status, Health::Healthy);
}

#[test]
fn stats_track_population_and_searches() {
    let registry = CalculatorRegistry::default();
    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();
    registry.register(plugin("cardiology", "map", "1.0.0", "cardiology", &[])).unwrap();
    registry.search(&SearchQuery::default());

    let stats = registry.get_stats();
    assert_eq!(stats.total_plugins, 2);
    assert_eq!(stats.namespaces, 2);
    assert_eq!(stats.by_category.get("cardiology"), Some(&1));
    assert_eq!(stats.searches, 1);
}

#[test]
fn unregister_removes_plugin_and_its_index_entries() {
    let registry = CalculatorRegistry::default();
    registry.register(plugin("general", "bmi", "1.0.0", "general", &["obesity"])).unwrap();
    assert!(registry.unregister("general.bmi").is_some());
    assert!(registry.unregister("general.bmi").is_none());
    assert!(registry.get("general.bmi").is_none());

    use medcalc_core::index::IndexKind;
    assert!(registry.index_bucket(IndexKind::Tag, "obesity").is_empty());
}

#[test]
fn reset_gives_tests_a_clean_slate() {
    let registry = CalculatorRegistry::default();
    registry.register(plugin("general", "bmi", "1.0.0", "general", &[])).unwrap();
    let _sub = registry.subscribe(Arc::new(|_| {})).unwrap();

    registry.reset();
    assert!(registry.is_empty());
    assert_eq!(registry.observer_count(), 0);
    assert_eq!(registry.get_stats().searches, 0);
}

#[test]
fn invalid_metadata_is_rejected_at_the_boundary() {
    let registry = CalculatorRegistry::default();
    let bad = plugin("general", "bmi", "not-semver", "general", &[]);
    assert!(matches!(
        registry.register(bad),
        Err(PluginError::Validation { .. })
    ));
}
