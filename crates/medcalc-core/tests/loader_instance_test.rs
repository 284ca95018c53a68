use async_trait::async_trait;
use medcalc_calculator::built_in::bmi::BmiCalculator;
use medcalc_calculator::{Calculator, CalculatorInputs, ProviderRegistry};
use medcalc_core::plugin::{CalculatorPlugin, PluginConfig, PluginMetadata};
use medcalc_core::{
    CalculatorRegistry, DiscoveryConfig, DiscoveryService, ErrorReporter, HeadlessAdapter,
    HostContainer, InstanceCallbacks, InstanceOptions, InstanceStatus, LoadOptions, LoaderConfig,
    PluginError, PluginLoader, RenderAdapter,
};
use medcalc_types::{CalculationOutcome, FieldValue, LocalizedText};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A calculator that never resolves; used to exercise timeout handling
struct StallCalculator;

#[async_trait]
impl Calculator for StallCalculator {
    async fn calculate(
        &self,
        _inputs: &CalculatorInputs<'_>,
    ) -> anyhow::Result<CalculationOutcome> {
        std::future::pending::<()>().await;
        unreachable!("pending future resolved")
    }
}

/// A calculator that takes a configurable time to answer
struct SlowCalculator(Duration);

#[async_trait]
impl Calculator for SlowCalculator {
    async fn calculate(
        &self,
        _inputs: &CalculatorInputs<'_>,
    ) -> anyhow::Result<CalculationOutcome> {
        tokio::time::sleep(self.0).await;
        Ok(CalculationOutcome::number(42.0))
    }
}

fn plugin_with(
    namespace: &str,
    id: &str,
    calculator: Arc<dyn Calculator>,
) -> Arc<CalculatorPlugin> {
    Arc::new(CalculatorPlugin::new(
        PluginMetadata {
            id: id.to_string(),
            namespace: namespace.to_string(),
            version: "1.0.0".to_string(),
            name: LocalizedText::with("en", id),
            description: LocalizedText::new(),
            author: "tests".to_string(),
            license: None,
            dependencies: vec![],
            conflicts: vec![],
            tags: vec![],
            created_at: None,
            updated_at: None,
        },
        PluginConfig {
            entry: id.to_string(),
            category: namespace.to_string(),
            ..Default::default()
        },
        calculator,
    ))
}

struct Fixture {
    registry: Arc<CalculatorRegistry>,
    loader: PluginLoader,
    _root: tempfile::TempDir,
}

fn fixture() -> Fixture {
    fixture_with_config(LoaderConfig::default())
}

fn fixture_with_config(config: LoaderConfig) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let registry = Arc::new(CalculatorRegistry::default());
    let discovery = Arc::new(DiscoveryService::new(
        DiscoveryConfig::new(root.path()),
        Arc::new(ProviderRegistry::with_built_ins()),
    ));
    let reporter = Arc::new(ErrorReporter::default());
    let loader = PluginLoader::new(registry.clone(), discovery, reporter, config);
    Fixture { registry, loader, _root: root }
}

fn container(id: &str) -> HostContainer {
    HostContainer::new(id, Arc::new(HeadlessAdapter))
}

fn bmi_inputs() -> HashMap<String, FieldValue> {
    HashMap::from([
        ("weight_kg".to_string(), FieldValue::Float(70.0)),
        ("height_cm".to_string(), FieldValue::Float(175.0)),
    ])
}

#[tokio::test]
async fn unknown_plugin_returns_none_without_corrupting_the_loader() {
    let fx = fixture();
    assert!(fx.loader.load_calculator("general.missing", &container("c1"), LoadOptions::default()).is_none());

    fx.registry.register(plugin_with("general", "bmi", Arc::new(BmiCalculator))).unwrap();
    let instance = fx
        .loader
        .load_calculator("general.bmi", &container("c1"), LoadOptions::default())
        .expect("valid plugin should load after a miss");
    assert_eq!(instance.status(), InstanceStatus::Ready);

    let stats = fx.loader.get_loader_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.loads, 1);
}

#[tokio::test]
async fn instances_in_separate_containers_are_independent() {
    let fx = fixture();
    fx.registry.register(plugin_with("general", "calc1", Arc::new(BmiCalculator))).unwrap();
    fx.registry.register(plugin_with("cardiology", "calc2", Arc::new(BmiCalculator))).unwrap();

    let first = fx
        .loader
        .load_calculator("general.calc1", &container("c1"), LoadOptions::default())
        .unwrap();
    let second = fx
        .loader
        .load_calculator("cardiology.calc2", &container("c2"), LoadOptions::default())
        .unwrap();

    let (a, b) = tokio::join!(first.calculate(bmi_inputs()), second.calculate(bmi_inputs()));
    a.unwrap();
    b.unwrap();
    assert_eq!(first.metrics().calculation_count, 1);
    assert_eq!(second.metrics().calculation_count, 1);

    first.destroy();
    assert_eq!(first.status(), InstanceStatus::Destroyed);
    assert_eq!(second.status(), InstanceStatus::Ready);
    assert_eq!(second.metrics().calculation_count, 1);

    // The survivor keeps calculating.
    second.calculate(bmi_inputs()).await.unwrap();
    assert_eq!(second.metrics().calculation_count, 2);
}

#[tokio::test]
async fn stalled_calculation_times_out_and_returns_to_ready() {
    let fx = fixture();
    fx.registry.register(plugin_with("general", "stall", Arc::new(StallCalculator))).unwrap();

    let options = InstanceOptions {
        calculation_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let instance = fx
        .loader
        .load_calculator(
            "general.stall",
            &container("c1"),
            LoadOptions { overrides: Some(options), ..Default::default() },
        )
        .unwrap();

    let error = instance.calculate(HashMap::new()).await.unwrap_err();
    match &error {
        PluginError::Timeout { plugin_id, namespace, operation, .. } => {
            assert_eq!(plugin_id.as_deref(), Some("stall"));
            assert_eq!(namespace.as_deref(), Some("general"));
            assert_eq!(operation.as_deref(), Some("calculate"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(instance.status(), InstanceStatus::Ready);
    assert_eq!(instance.metrics().error_count, 1);
}

#[tokio::test]
async fn destroy_is_idempotent_and_calculate_rejects_afterwards() {
    let fx = fixture();
    fx.registry.register(plugin_with("general", "bmi", Arc::new(BmiCalculator))).unwrap();
    let instance = fx
        .loader
        .load_calculator("general.bmi", &container("c1"), LoadOptions::default())
        .unwrap();

    instance.destroy();
    instance.destroy();
    assert_eq!(instance.status(), InstanceStatus::Destroyed);

    let error = instance.calculate(bmi_inputs()).await.unwrap_err();
    assert!(error.to_string().contains("destroyed"));
}

#[tokio::test]
async fn newer_calculate_supersedes_the_one_in_flight() {
    let fx = fixture();
    fx.registry
        .register(plugin_with(
            "general",
            "slow",
            Arc::new(SlowCalculator(Duration::from_millis(300))),
        ))
        .unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    let delivered_clone = delivered.clone();
    let callbacks = InstanceCallbacks {
        on_calculate: Some(Arc::new(move |_| {
            delivered_clone.fetch_add(1, Ordering::SeqCst);
        })),
        ..Default::default()
    };
    let instance = fx
        .loader
        .load_calculator(
            "general.slow",
            &container("c1"),
            LoadOptions { callbacks, ..Default::default() },
        )
        .unwrap();

    let racer = instance.clone();
    let first = tokio::spawn(async move { racer.calculate(HashMap::new()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = instance.calculate(HashMap::new()).await;
    second.unwrap();

    let first = first.await.unwrap();
    let error = first.unwrap_err();
    assert!(error.to_string().contains("superseded"));

    // Only the winning calculation reached the callbacks or the metrics.
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(instance.metrics().calculation_count, 1);
    assert_eq!(instance.status(), InstanceStatus::Ready);
}

#[tokio::test]
async fn same_container_gets_a_fresh_instance_and_the_prior_is_destroyed() {
    let fx = fixture();
    fx.registry.register(plugin_with("general", "bmi", Arc::new(BmiCalculator))).unwrap();

    let target = container("c1");
    let first = fx
        .loader
        .load_calculator("general.bmi", &target, LoadOptions::default())
        .unwrap();
    let second = fx
        .loader
        .load_calculator("general.bmi", &target, LoadOptions::default())
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.status(), InstanceStatus::Destroyed);
    assert_eq!(second.status(), InstanceStatus::Ready);
    assert_eq!(fx.loader.get_loader_stats().active_instances, 1);
}

#[tokio::test]
async fn instance_cache_evicts_oldest_first() {
    let fx = fixture_with_config(LoaderConfig { max_instances: 2, ..Default::default() });
    fx.registry.register(plugin_with("general", "bmi", Arc::new(BmiCalculator))).unwrap();

    let first = fx
        .loader
        .load_calculator("general.bmi", &container("c1"), LoadOptions::default())
        .unwrap();
    let _second = fx
        .loader
        .load_calculator("general.bmi", &container("c2"), LoadOptions::default())
        .unwrap();
    let _third = fx
        .loader
        .load_calculator("general.bmi", &container("c3"), LoadOptions::default())
        .unwrap();

    assert_eq!(first.status(), InstanceStatus::Destroyed);
    let stats = fx.loader.get_loader_stats();
    assert_eq!(stats.active_instances, 2);
    assert_eq!(stats.evictions, 1);
}

#[tokio::test]
async fn clearing_caches_leaves_held_instances_functional() {
    let fx = fixture();
    fx.registry.register(plugin_with("general", "bmi", Arc::new(BmiCalculator))).unwrap();
    let instance = fx
        .loader
        .load_calculator("general.bmi", &container("c1"), LoadOptions::default())
        .unwrap();

    fx.loader.clear_caches();
    assert_eq!(fx.loader.get_loader_stats().active_instances, 0);

    // The caller's handle captured its data before the clear.
    assert_ne!(instance.status(), InstanceStatus::Destroyed);
    instance.calculate(bmi_inputs()).await.unwrap();
}

#[tokio::test]
async fn system_metrics_aggregate_without_crossing_instances() {
    let fx = fixture();
    fx.registry.register(plugin_with("general", "calc1", Arc::new(BmiCalculator))).unwrap();
    fx.registry.register(plugin_with("cardiology", "calc2", Arc::new(BmiCalculator))).unwrap();

    let first = fx
        .loader
        .load_calculator("general.calc1", &container("c1"), LoadOptions::default())
        .unwrap();
    let second = fx
        .loader
        .load_calculator("cardiology.calc2", &container("c2"), LoadOptions::default())
        .unwrap();

    first.calculate(bmi_inputs()).await.unwrap();
    first.calculate(bmi_inputs()).await.unwrap();
    second.calculate(bmi_inputs()).await.unwrap();

    let metrics = fx.loader.get_system_performance_metrics();
    assert_eq!(metrics.active_plugins, 2);
    assert_eq!(metrics.active_instances, 2);
    assert_eq!(metrics.total_calculations, 3);
    assert_eq!(first.metrics().calculation_count, 2);
    assert_eq!(second.metrics().calculation_count, 1);
}

#[tokio::test]
async fn validation_failure_rejects_before_calculation() {
    let fx = fixture();
    fx.registry.register(plugin_with("general", "bmi", Arc::new(BmiCalculator))).unwrap();
    let instance = fx
        .loader
        .load_calculator("general.bmi", &container("c1"), LoadOptions::default())
        .unwrap();

    let inputs = HashMap::from([
        ("weight_kg".to_string(), FieldValue::Float(70.0)),
        ("height_cm".to_string(), FieldValue::Float(1.75)),
    ]);
    let error = instance.calculate(inputs).await.unwrap_err();
    assert!(matches!(error, PluginError::Validation { .. }));
    assert_eq!(instance.status(), InstanceStatus::Error);

    // Reset clears the error state.
    instance.reset();
    assert_eq!(instance.status(), InstanceStatus::Ready);
    instance.calculate(bmi_inputs()).await.unwrap();
}

struct FailingAdapter;

impl RenderAdapter for FailingAdapter {
    fn mount(
        &self,
        _plugin: &CalculatorPlugin,
        _callbacks: &InstanceCallbacks,
    ) -> Result<(), PluginError> {
        Err(PluginError::load("mount target is gone"))
    }

    fn unmount(&self) {}
}

#[tokio::test]
async fn render_failure_respects_the_error_boundary_setting() {
    let fx = fixture();
    fx.registry.register(plugin_with("general", "bmi", Arc::new(BmiCalculator))).unwrap();

    // Default: error boundary on, instance surfaces the failure as state.
    let boundary = HostContainer::new("c1", Arc::new(FailingAdapter));
    let instance = fx
        .loader
        .load_calculator("general.bmi", &boundary, LoadOptions::default())
        .unwrap();
    assert_eq!(instance.status(), InstanceStatus::Error);

    // Without a boundary the load reports failure by returning None.
    let unguarded = HostContainer::new("c2", Arc::new(FailingAdapter));
    let options = InstanceOptions { error_boundary: false, ..Default::default() };
    let missing = fx.loader.load_calculator(
        "general.bmi",
        &unguarded,
        LoadOptions { overrides: Some(options), ..Default::default() },
    );
    assert!(missing.is_none());
}

#[tokio::test]
async fn reload_replaces_the_registry_entry_from_source() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("general").join("bmi");
    std::fs::create_dir_all(&dir).unwrap();
    let document = |version: &str| {
        serde_json::json!({
            "id": "bmi",
            "version": version,
            "name": { "en": "Body Mass Index" },
            "entry": "bmi",
            "category": "general"
        })
        .to_string()
    };
    std::fs::write(dir.join("calculator.json"), document("1.0.0")).unwrap();

    let registry = Arc::new(CalculatorRegistry::default());
    let discovery = Arc::new(DiscoveryService::new(
        DiscoveryConfig::new(root.path()),
        Arc::new(ProviderRegistry::with_built_ins()),
    ));
    let loader = PluginLoader::new(
        registry.clone(),
        discovery.clone(),
        Arc::new(ErrorReporter::default()),
        LoaderConfig::default(),
    );

    let result = discovery.load_one("bmi", Some("general")).await;
    registry.register(result.plugin.unwrap()).unwrap();
    assert_eq!(registry.get("general.bmi").unwrap().metadata.version, "1.0.0");

    std::fs::write(dir.join("calculator.json"), document("1.1.0")).unwrap();
    loader.reload_plugin("general.bmi").await.unwrap();
    assert_eq!(registry.get("general.bmi").unwrap().metadata.version, "1.1.0");
}
