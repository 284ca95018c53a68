//! Process-wide plugin catalogue
//!
//! Owns the primary plugin map, the derived indices, the event bus and the
//! search/health/stats surfaces. Constructed explicitly and passed to
//! discovery and the loader; `reset()` gives tests a clean slate without
//! process-global state.

use crate::error::{PluginError, PluginResult};
use crate::events::{Observer, ObserverSet, RegistryEvent, Subscription};
use crate::index::{IndexKind, build_index, strategy_for};
use crate::plugin::{CalculatorPlugin, PluginConfig};
use crate::search::{SearchQuery, run_search};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Registry tuning knobs
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum concurrent event observers
    pub max_observers: usize,
    /// Average search time above which health degrades, in milliseconds
    pub search_warn_ms: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_observers: 64, search_warn_ms: 50.0 }
    }
}

/// A stored plugin plus registration bookkeeping
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub plugin: Arc<CalculatorPlugin>,
    pub registered_at: DateTime<Utc>,
}

/// Running search performance metric
#[derive(Debug, Clone, Copy, Default)]
struct SearchMetrics {
    count: u64,
    avg_ms: f64,
}

/// Registry snapshot statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_plugins: usize,
    pub namespaces: usize,
    pub by_category: HashMap<String, usize>,
    pub observers: usize,
    pub searches: u64,
    pub avg_search_ms: f64,
}

/// Overall registry health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

/// One reportable health problem
#[derive(Debug, Clone, Serialize)]
pub struct HealthIssue {
    pub component: String,
    pub message: String,
}

/// Structured health report; never an exception
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: Health,
    pub issues: Vec<HealthIssue>,
}

/// The process-wide catalogue of successfully loaded plugins
pub struct CalculatorRegistry {
    config: RegistryConfig,
    entries: RwLock<AHashMap<String, RegistryEntry>>,
    indices: RwLock<AHashMap<IndexKind, AHashMap<String, Vec<String>>>>,
    /// Serializes index rebuilds so a search never reads mid-rebuild state
    rebuild_lock: Mutex<()>,
    observers: Arc<ObserverSet>,
    search_metrics: Mutex<SearchMetrics>,
}

impl Default for CalculatorRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl CalculatorRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let observers = Arc::new(ObserverSet::new(config.max_observers));
        Self {
            config,
            entries: RwLock::new(AHashMap::new()),
            indices: RwLock::new(AHashMap::new()),
            rebuild_lock: Mutex::new(()),
            observers,
            search_metrics: Mutex::new(SearchMetrics::default()),
        }
    }

    /// Register a plugin under its `(namespace, id)` key.
    ///
    /// Rejects with a conflict error when the key is already present with an
    /// equal-or-higher version; a strictly higher version replaces the
    /// existing entry (upgrade).
    #[instrument(skip(self, plugin), fields(key = %plugin.key()))]
    pub fn register(&self, plugin: Arc<CalculatorPlugin>) -> PluginResult<()> {
        plugin.validate_shape()?;
        let key = plugin.key();
        let incoming = plugin.metadata.semver()?;

        {
            let mut entries = self.entries.write().unwrap();
            if let Some(existing) = entries.get(&key) {
                let existing_version = existing.plugin.metadata.semver()?;
                if existing_version >= incoming {
                    return Err(PluginError::conflict(
                        &key,
                        &existing.plugin.metadata.version,
                        format!(
                            "plugin '{key}' is already registered at version {} (incoming {})",
                            existing.plugin.metadata.version, plugin.metadata.version
                        ),
                    ));
                }
                info!(
                    key = %key,
                    from = %existing.plugin.metadata.version,
                    to = %plugin.metadata.version,
                    "upgrading registered plugin"
                );
            }
            entries
                .insert(key.clone(), RegistryEntry { plugin: plugin.clone(), registered_at: Utc::now() });
        }

        self.rebuild_indices();
        self.observers.emit(&RegistryEvent::CalculatorAdded {
            key,
            version: plugin.metadata.version.clone(),
        });
        Ok(())
    }

    /// Remove a plugin, returning it when present
    pub fn unregister(&self, key: &str) -> Option<Arc<CalculatorPlugin>> {
        let removed = {
            let mut entries = self.entries.write().unwrap();
            entries.remove(key).map(|entry| entry.plugin)
        };
        if removed.is_some() {
            self.rebuild_indices();
            self.observers.emit(&RegistryEvent::CalculatorRemoved { key: key.to_string() });
        } else {
            debug!(key = key, "unregister miss");
        }
        removed
    }

    pub fn get(&self, key: &str) -> Option<Arc<CalculatorPlugin>> {
        self.entries.read().unwrap().get(key).map(|entry| entry.plugin.clone())
    }

    /// Every registered plugin, sorted by key for deterministic iteration
    pub fn all(&self) -> Vec<Arc<CalculatorPlugin>> {
        let mut plugins: Vec<Arc<CalculatorPlugin>> = self
            .entries
            .read()
            .unwrap()
            .values()
            .map(|entry| entry.plugin.clone())
            .collect();
        plugins.sort_by_key(|a| a.key());
        plugins
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Plugins in one index bucket, resolved against the primary map
    pub fn index_bucket(&self, kind: IndexKind, bucket: &str) -> Vec<Arc<CalculatorPlugin>> {
        let keys: Vec<String> = {
            let indices = self.indices.read().unwrap();
            indices
                .get(&kind)
                .and_then(|index| index.get(bucket))
                .cloned()
                .unwrap_or_default()
        };
        let entries = self.entries.read().unwrap();
        keys.iter().filter_map(|key| entries.get(key).map(|e| e.plugin.clone())).collect()
    }

    /// Search the catalogue. Strategy, filters, sort and pagination compose
    /// per the query; results are stable across identically-parameterized
    /// calls.
    #[instrument(skip(self, query))]
    pub fn search(&self, query: &SearchQuery) -> Vec<Arc<CalculatorPlugin>> {
        let started = Instant::now();
        let results = run_search(self.all(), query);
        let elapsed = started.elapsed();

        {
            let mut metrics = self.search_metrics.lock().unwrap();
            metrics.count += 1;
            let sample_ms = elapsed.as_secs_f64() * 1000.0;
            metrics.avg_ms += (sample_ms - metrics.avg_ms) / metrics.count as f64;
        }
        self.observers.emit(&RegistryEvent::SearchPerformed {
            strategy: crate::search::strategy_for(query.strategy).name(),
            results: results.len(),
            duration: elapsed,
        });
        results
    }

    /// Register an event observer; the returned subscription unsubscribes
    /// on drop
    pub fn subscribe(&self, observer: Observer) -> PluginResult<Subscription> {
        ObserverSet::subscribe(&self.observers, observer)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Shape-validate a config document without registering anything
    pub fn validate_config(&self, config: &PluginConfig) -> PluginResult<()> {
        config.validate()
    }

    pub fn get_stats(&self) -> RegistryStats {
        let entries = self.entries.read().unwrap();
        let mut by_category: HashMap<String, usize> = HashMap::new();
        let mut namespaces: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for entry in entries.values() {
            *by_category.entry(entry.plugin.config.category.clone()).or_default() += 1;
            namespaces.insert(entry.plugin.metadata.namespace.as_str());
        }
        let metrics = *self.search_metrics.lock().unwrap();
        RegistryStats {
            total_plugins: entries.len(),
            namespaces: namespaces.len(),
            by_category,
            observers: self.observers.len(),
            searches: metrics.count,
            avg_search_ms: metrics.avg_ms,
        }
    }

    /// Structured health report. Unhealthy on an empty registry or when
    /// searches run slower than the configured threshold; always a value,
    /// never an exception.
    pub fn get_health_status(&self) -> HealthStatus {
        let mut issues = Vec::new();
        if self.is_empty() {
            issues.push(HealthIssue {
                component: "registry".to_string(),
                message: "no plugins registered".to_string(),
            });
        }
        let metrics = *self.search_metrics.lock().unwrap();
        let slow_searches = metrics.count > 0 && metrics.avg_ms > self.config.search_warn_ms;
        if slow_searches {
            issues.push(HealthIssue {
                component: "search".to_string(),
                message: format!(
                    "average search time {:.1}ms exceeds threshold {:.1}ms",
                    metrics.avg_ms, self.config.search_warn_ms
                ),
            });
        }

        let status = if self.is_empty() || slow_searches {
            Health::Unhealthy
        } else {
            Health::Healthy
        };
        if status != Health::Healthy {
            warn!(?status, issues = issues.len(), "registry health check found issues");
        }
        HealthStatus { status, issues }
    }

    /// Clear all plugins, indices, observers and metrics. Test isolation.
    pub fn reset(&self) {
        self.entries.write().unwrap().clear();
        self.indices.write().unwrap().clear();
        self.observers.clear();
        *self.search_metrics.lock().unwrap() = SearchMetrics::default();
    }

    /// Rebuild every index from the current plugin snapshot. Full rebuild
    /// for correctness over incremental patching; rebuilds are serialized
    /// so a concurrent search never observes a half-built index.
    fn rebuild_indices(&self) {
        let plugin_count = {
            let _serialize = self.rebuild_lock.lock().unwrap();
            let plugins = self.all();
            let mut fresh: AHashMap<IndexKind, AHashMap<String, Vec<String>>> = AHashMap::new();
            for kind in IndexKind::all() {
                let strategy = strategy_for(kind);
                fresh.insert(kind, build_index(strategy.as_ref(), &plugins));
            }
            *self.indices.write().unwrap() = fresh;
            plugins.len()
        };
        self.observers.emit(&RegistryEvent::IndexRebuilt { plugin_count });
    }
}
