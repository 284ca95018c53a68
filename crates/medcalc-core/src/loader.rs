//! Plugin loader
//!
//! Turns registered plugins into live instances bound to host containers.
//! Owns the instance cache and the cross-instance isolation guarantees: a
//! missing plugin returns `None` without corrupting the loader, and no
//! instance can observe another's state or metrics.

use crate::discovery::DiscoveryService;
use crate::error::{PluginError, PluginResult};
use crate::instance::{CalculatorInstance, InstanceCallbacks, InstanceOptions, RenderAdapter};
use crate::registry::CalculatorRegistry;
use crate::recovery::ErrorReporter;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Loader tuning knobs
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum live instances cached at once; oldest-first eviction
    pub max_instances: usize,
    /// Defaults applied to instances created without overrides
    pub instance: InstanceOptions,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { max_instances: 32, instance: InstanceOptions::default() }
    }
}

/// A host mount point: an identity plus the rendering boundary
#[derive(Clone)]
pub struct HostContainer {
    pub id: String,
    pub adapter: Arc<dyn RenderAdapter>,
}

impl HostContainer {
    pub fn new(id: &str, adapter: Arc<dyn RenderAdapter>) -> Self {
        Self { id: id.to_string(), adapter }
    }
}

/// Per-load options
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub callbacks: InstanceCallbacks,
    /// Overrides the loader's default instance options when set
    pub overrides: Option<InstanceOptions>,
}

/// Loader activity counters
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct LoaderStats {
    pub active_instances: usize,
    pub loads: u64,
    pub misses: u64,
    pub evictions: u64,
    pub reloads: u64,
}

/// Aggregate of per-instance metrics. Plugins cannot see or influence each
/// other's numbers; this view is computed by the loader alone.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SystemPerformanceMetrics {
    pub active_plugins: usize,
    pub active_instances: usize,
    pub total_calculations: u64,
    pub total_errors: u64,
    pub avg_calculation_ms: f64,
}

#[derive(Default)]
struct LoaderInner {
    /// Instances keyed by container id
    instances: HashMap<String, Arc<CalculatorInstance>>,
    /// Container ids in creation order, for oldest-first eviction
    order: VecDeque<String>,
    loads: u64,
    misses: u64,
    evictions: u64,
    reloads: u64,
}

/// Creates and caches live plugin instances
pub struct PluginLoader {
    registry: Arc<CalculatorRegistry>,
    discovery: Arc<DiscoveryService>,
    reporter: Arc<ErrorReporter>,
    config: LoaderConfig,
    inner: Mutex<LoaderInner>,
}

impl PluginLoader {
    pub fn new(
        registry: Arc<CalculatorRegistry>,
        discovery: Arc<DiscoveryService>,
        reporter: Arc<ErrorReporter>,
        config: LoaderConfig,
    ) -> Self {
        Self { registry, discovery, reporter, config, inner: Mutex::new(LoaderInner::default()) }
    }

    /// Load a plugin into a host container, returning a live instance.
    ///
    /// An unregistered key returns `None` and leaves the loader untouched.
    /// Each container gets its own independent instance; loading into a
    /// container that already holds one destroys the prior instance and
    /// creates a fresh one rather than leaking two instances bound to a
    /// single host node.
    #[instrument(skip(self, container, options), fields(container = %container.id))]
    pub fn load_calculator(
        &self,
        plugin_key: &str,
        container: &HostContainer,
        options: LoadOptions,
    ) -> Option<Arc<CalculatorInstance>> {
        let Some(plugin) = self.registry.get(plugin_key) else {
            warn!(key = plugin_key, "load requested for unregistered plugin");
            self.inner.lock().unwrap().misses += 1;
            return None;
        };

        let instance_options =
            options.overrides.unwrap_or_else(|| self.config.instance.clone());
        let instance = Arc::new(CalculatorInstance::new(
            plugin,
            &container.id,
            container.adapter.clone(),
            options.callbacks,
            instance_options,
            self.reporter.clone(),
        ));

        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(previous) = inner.instances.remove(&container.id) {
                debug!(container = %container.id, "replacing prior instance for container");
                inner.order.retain(|id| id != &container.id);
                previous.destroy();
            }
            while inner.instances.len() >= self.config.max_instances {
                let Some(oldest) = inner.order.pop_front() else { break };
                if let Some(evicted) = inner.instances.remove(&oldest) {
                    evicted.destroy();
                    inner.evictions += 1;
                }
            }
            inner.instances.insert(container.id.clone(), instance.clone());
            inner.order.push_back(container.id.clone());
            inner.loads += 1;
        }

        match instance.render() {
            Ok(()) => Some(instance),
            Err(error) => {
                // Only reachable without an error boundary; the instance is
                // already in error state and reported.
                warn!(key = plugin_key, error = %error, "render failed without error boundary");
                instance.destroy();
                let mut inner = self.inner.lock().unwrap();
                inner.instances.remove(&container.id);
                inner.order.retain(|id| id != &container.id);
                None
            }
        }
    }

    /// Re-run discovery for one plugin and replace its registry entry.
    /// Existing instances keep the plugin they were created with.
    #[instrument(skip(self))]
    pub async fn reload_plugin(&self, plugin_key: &str) -> PluginResult<()> {
        let (namespace, id) = plugin_key.split_once('.').ok_or_else(|| {
            PluginError::validation(format!("'{plugin_key}' is not a namespace.id key"))
        })?;

        self.discovery.invalidate_plugin(namespace, id);
        let result = self.discovery.load_one(id, Some(namespace)).await;
        let Some(plugin) = result.plugin else {
            return Err(result.error_details.unwrap_or_else(|| {
                PluginError::load(format!("reload of '{plugin_key}' produced no plugin"))
            }));
        };

        self.registry.unregister(plugin_key);
        self.registry.register(plugin)?;
        self.inner.lock().unwrap().reloads += 1;
        info!(key = plugin_key, "plugin reloaded");
        Ok(())
    }

    /// Forget cached instances without destroying them: callers holding an
    /// instance keep a fully functional handle.
    pub fn clear_caches(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.instances.clear();
        inner.order.clear();
        debug!("loader caches cleared");
    }

    /// Fetch the live instance bound to a container, if any
    pub fn instance_for(&self, container_id: &str) -> Option<Arc<CalculatorInstance>> {
        self.inner.lock().unwrap().instances.get(container_id).cloned()
    }

    pub fn get_loader_stats(&self) -> LoaderStats {
        let inner = self.inner.lock().unwrap();
        LoaderStats {
            active_instances: inner.instances.len(),
            loads: inner.loads,
            misses: inner.misses,
            evictions: inner.evictions,
            reloads: inner.reloads,
        }
    }

    /// Aggregate instance metrics across all live instances
    pub fn get_system_performance_metrics(&self) -> SystemPerformanceMetrics {
        let instances: Vec<Arc<CalculatorInstance>> = {
            let inner = self.inner.lock().unwrap();
            inner.instances.values().cloned().collect()
        };

        let mut plugins = std::collections::HashSet::new();
        let mut total_calculations = 0u64;
        let mut total_errors = 0u64;
        let mut weighted_ms = 0.0;
        for instance in &instances {
            let metrics = instance.metrics();
            plugins.insert(instance.plugin().key());
            total_calculations += metrics.calculation_count;
            total_errors += metrics.error_count;
            weighted_ms += metrics.avg_calculation_ms * metrics.calculation_count as f64;
        }
        let avg_calculation_ms = if total_calculations > 0 {
            weighted_ms / total_calculations as f64
        } else {
            0.0
        };
        SystemPerformanceMetrics {
            active_plugins: plugins.len(),
            active_instances: instances.len(),
            total_calculations,
            total_errors,
            avg_calculation_ms,
        }
    }
}
