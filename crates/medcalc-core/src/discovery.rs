//! Plugin discovery
//!
//! Scans a plugin source tree for candidate calculator directories,
//! validates their config documents, and resolves each one to a
//! `LoadResult`. Failures never escape as errors: every candidate produces
//! a result so batch discovery continues past individual bad plugins.
//!
//! Source layout: `<root>/<namespace>/<plugin-id>/calculator.{json,yaml}`.
//! A plugin directory placed directly under the root derives its namespace
//! from the config category instead.

use crate::cache::{CacheStats, TimedLruCache};
use crate::error::{PluginError, PluginResult};
use crate::plugin::{
    CalculatorPlugin, FieldDef, PluginConfig, PluginMetadata, RUNTIME_VERSION,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use medcalc_calculator::ProviderRegistry;
use medcalc_types::LocalizedText;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Config document file names probed in order; the first is the canonical
/// name used in "missing file" diagnostics.
const CONFIG_FILE_NAMES: [&str; 3] = ["calculator.json", "calculator.yaml", "calculator.yml"];

/// Discovery tuning knobs
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Root of the plugin source tree
    pub root: PathBuf,
    /// Directory name fragments excluded from scanning
    pub exclude: Vec<String>,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Enables dev-only conveniences such as the source watcher
    pub dev_mode: bool,
}

impl DiscoveryConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: vec!["template".to_string(), "test".to_string()],
            cache_capacity: 128,
            cache_ttl: Duration::from_secs(300),
            dev_mode: false,
        }
    }
}

/// The outcome of loading one discovered candidate. Always returned as
/// data, never raised.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub success: bool,
    pub plugin: Option<Arc<CalculatorPlugin>>,
    pub error: Option<String>,
    pub error_details: Option<PluginError>,
    pub load_time: Duration,
    pub source: Option<PathBuf>,
}

impl LoadResult {
    fn loaded(plugin: Arc<CalculatorPlugin>, load_time: Duration, source: PathBuf) -> Self {
        Self {
            success: true,
            plugin: Some(plugin),
            error: None,
            error_details: None,
            load_time,
            source: Some(source),
        }
    }

    fn failed(error: PluginError, load_time: Duration, source: Option<PathBuf>) -> Self {
        Self {
            success: false,
            plugin: None,
            error: Some(error.to_string()),
            error_details: Some(error),
            load_time,
            source,
        }
    }
}

/// Aggregate scan statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DiscoveryStats {
    pub scanned: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: f64,
}

/// Result of a full or per-namespace discovery pass
#[derive(Debug)]
pub struct DiscoveryReport {
    pub discovered: Vec<LoadResult>,
    pub failed: Vec<LoadResult>,
    pub stats: DiscoveryStats,
    pub warnings: Vec<String>,
}

/// One scan candidate before loading
#[derive(Debug, Clone)]
struct Candidate {
    /// Namespace from directory nesting; empty when derived from config
    namespace: String,
    dir: PathBuf,
}

/// Locates and validates plugin candidates under a configured root
pub struct DiscoveryService {
    config: DiscoveryConfig,
    providers: Arc<ProviderRegistry>,
    cache: Mutex<TimedLruCache<PathBuf, Arc<CalculatorPlugin>>>,
}

impl DiscoveryService {
    pub fn new(config: DiscoveryConfig, providers: Arc<ProviderRegistry>) -> Self {
        let cache = Mutex::new(TimedLruCache::new(config.cache_capacity, config.cache_ttl));
        Self { config, providers, cache }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discover every candidate under the root
    #[instrument(skip(self))]
    pub async fn discover_all(&self) -> DiscoveryReport {
        self.discover_filtered(None).await
    }

    /// Discover candidates within a single namespace directory
    #[instrument(skip(self))]
    pub async fn discover_namespace(&self, namespace: &str) -> DiscoveryReport {
        self.discover_filtered(Some(namespace)).await
    }

    /// Load a single plugin by id, optionally pinned to a namespace.
    /// Without a namespace the scan order (sorted directory names)
    /// determines which match wins.
    pub async fn load_one(&self, id: &str, namespace: Option<&str>) -> LoadResult {
        let started = Instant::now();
        let candidate = match namespace {
            Some(ns) => {
                let dir = self.config.root.join(ns).join(id);
                if dir.is_dir() {
                    Some(Candidate { namespace: ns.to_string(), dir })
                } else {
                    None
                }
            }
            None => {
                let mut found = None;
                for ns in self.list_namespaces().await {
                    let dir = self.config.root.join(&ns).join(id);
                    if dir.is_dir() {
                        found = Some(Candidate { namespace: ns, dir });
                        break;
                    }
                }
                found
            }
        };

        match candidate {
            Some(candidate) => self.load_candidate(&candidate).await,
            None => LoadResult::failed(
                PluginError::load_from(
                    id,
                    &self.config.root.display().to_string(),
                    format!("plugin directory '{id}' was not found"),
                ),
                started.elapsed(),
                None,
            ),
        }
    }

    /// Namespace directories under the root, sorted
    pub async fn list_namespaces(&self) -> Vec<String> {
        let mut namespaces = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.config.root).await else {
            return namespaces;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && !self.is_excluded(&name) {
                namespaces.push(name);
            }
        }
        namespaces.sort();
        namespaces
    }

    /// Drop every cached candidate
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap().stats()
    }

    /// Drop the cached candidate for one plugin directory, forcing the
    /// next load to re-read its config document
    pub fn invalidate_plugin(&self, namespace: &str, id: &str) {
        let dir = self.config.root.join(namespace).join(id);
        self.invalidate_path(&dir);
    }

    /// Invalidate cache entries under a changed path. Used by the dev-mode
    /// source watcher; correctness never depends on it.
    pub fn invalidate_path(&self, path: &Path) {
        let changed = path.to_path_buf();
        self.cache
            .lock()
            .unwrap()
            .remove_matching(|key| key == &changed || key.starts_with(&changed));
    }

    async fn discover_filtered(&self, namespace: Option<&str>) -> DiscoveryReport {
        let started = Instant::now();
        let (candidates, mut warnings) = self.collect_candidates(namespace).await;
        let scanned = candidates.len();

        // Candidates load in parallel; each load is wrapped so a failure
        // becomes a failed LoadResult instead of rejecting the batch.
        let results = join_all(candidates.iter().map(|c| self.load_candidate(c))).await;

        let mut discovered = Vec::new();
        let mut failed = Vec::new();
        let mut seen_keys: std::collections::HashSet<String> = std::collections::HashSet::new();
        for result in results {
            if result.success {
                let key = result.plugin.as_ref().map(|p| p.key()).unwrap_or_default();
                if !seen_keys.insert(key.clone()) {
                    warnings.push(format!(
                        "duplicate plugin key '{key}' at {}; first occurrence wins",
                        result
                            .source
                            .as_deref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default()
                    ));
                    continue;
                }
                discovered.push(result);
            } else {
                failed.push(result);
            }
        }

        let stats = DiscoveryStats {
            scanned,
            succeeded: discovered.len(),
            failed: failed.len(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            scanned = stats.scanned,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "discovery pass complete"
        );
        DiscoveryReport { discovered, failed, stats, warnings }
    }

    /// Enumerate candidate plugin directories. Sorted directory order keeps
    /// first-wins collision resolution deterministic for a given tree.
    async fn collect_candidates(&self, only_namespace: Option<&str>) -> (Vec<Candidate>, Vec<String>) {
        let mut candidates = Vec::new();
        let mut warnings = Vec::new();

        let namespaces = match only_namespace {
            Some(ns) => vec![ns.to_string()],
            None => self.list_namespaces().await,
        };

        for ns in namespaces {
            let ns_dir = self.config.root.join(&ns);
            // A config document directly inside the directory means this is
            // a flat plugin dir, not a namespace; category supplies the
            // namespace after parsing.
            if find_config_file(&ns_dir).is_some() {
                candidates.push(Candidate { namespace: String::new(), dir: ns_dir });
                continue;
            }

            let Ok(mut entries) = tokio::fs::read_dir(&ns_dir).await else {
                warnings.push(format!("namespace directory '{ns}' could not be read"));
                continue;
            };
            let mut dirs = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() && !self.is_excluded(&name) {
                    dirs.push(entry.path());
                }
            }
            dirs.sort();
            for dir in dirs {
                candidates.push(Candidate { namespace: ns.clone(), dir });
            }
        }
        (candidates, warnings)
    }

    /// Load and validate a single candidate. Never returns an error: every
    /// failure mode is folded into the LoadResult.
    async fn load_candidate(&self, candidate: &Candidate) -> LoadResult {
        let started = Instant::now();

        let Some(config_path) = find_config_file(&candidate.dir) else {
            let id = dir_name(&candidate.dir);
            return LoadResult::failed(
                PluginError::load_from(
                    &id,
                    &candidate.dir.display().to_string(),
                    format!("missing required config document '{}'", CONFIG_FILE_NAMES[0]),
                ),
                started.elapsed(),
                Some(candidate.dir.clone()),
            );
        };

        if let Some(cached) = self.cache.lock().unwrap().get(&config_path) {
            debug!(path = %config_path.display(), "discovery cache hit");
            return LoadResult::loaded(cached, started.elapsed(), config_path);
        }

        match self.parse_and_build(candidate, &config_path).await {
            Ok(plugin) => {
                self.cache.lock().unwrap().put(config_path.clone(), plugin.clone());
                LoadResult::loaded(plugin, started.elapsed(), config_path)
            }
            Err(error) => {
                warn!(path = %config_path.display(), error = %error, "candidate failed to load");
                LoadResult::failed(error, started.elapsed(), Some(config_path))
            }
        }
    }

    async fn parse_and_build(
        &self,
        candidate: &Candidate,
        config_path: &Path,
    ) -> PluginResult<Arc<CalculatorPlugin>> {
        let raw = tokio::fs::read_to_string(config_path).await.map_err(|e| {
            PluginError::load_from(
                &dir_name(&candidate.dir),
                &config_path.display().to_string(),
                format!("failed to read config document: {e}"),
            )
        })?;

        let document = parse_document(config_path, &raw)?;
        let (mut metadata, config) = document.split();

        // Namespace precedence: explicit config value, directory nesting,
        // then config category for flat layouts.
        if metadata.namespace.is_empty() {
            metadata.namespace = if candidate.namespace.is_empty() {
                config.category.clone()
            } else {
                candidate.namespace.clone()
            };
        }

        metadata.validate()?;
        config.validate()?;

        let calculator = self.providers.get(&config.entry).ok_or_else(|| {
            PluginError::load_from(
                &metadata.id,
                &config_path.display().to_string(),
                format!("entry point '{}' is not a registered calculator provider", config.entry),
            )
        })?;

        if !calculator.check_compatibility(RUNTIME_VERSION) {
            return Err(PluginError::compatibility(&metadata.id, RUNTIME_VERSION));
        }

        Ok(Arc::new(CalculatorPlugin::new(metadata, config, calculator)))
    }

    fn is_excluded(&self, name: &str) -> bool {
        name.starts_with('.')
            || name.starts_with('_')
            || self.config.exclude.iter().any(|pattern| name.contains(pattern.as_str()))
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES.iter().map(|name| dir.join(name)).find(|path| path.is_file())
}

/// The on-disk config document: metadata and config in one file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigDocument {
    id: String,
    #[serde(default)]
    namespace: Option<String>,
    version: String,
    name: LocalizedText,
    #[serde(default)]
    description: LocalizedText,
    #[serde(default)]
    author: String,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    conflicts: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entry: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    specialty: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    evidence_level: Option<String>,
    #[serde(default)]
    fields: Vec<FieldDef>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl ConfigDocument {
    fn split(self) -> (PluginMetadata, PluginConfig) {
        let metadata = PluginMetadata {
            id: self.id,
            namespace: self.namespace.unwrap_or_default(),
            version: self.version,
            name: self.name,
            description: self.description,
            author: self.author,
            license: self.license,
            dependencies: self.dependencies,
            conflicts: self.conflicts,
            tags: self.tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        let config = PluginConfig {
            entry: self.entry,
            category: self.category,
            specialty: self.specialty,
            difficulty: self.difficulty,
            evidence_level: self.evidence_level,
            fields: self.fields,
            extra: self.extra,
        };
        (metadata, config)
    }
}

fn parse_document(path: &Path, raw: &str) -> PluginResult<ConfigDocument> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match extension {
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| {
            PluginError::load(format!(
                "failed to parse YAML config {}: {e}",
                path.display()
            ))
        }),
        _ => serde_json::from_str(raw).map_err(|e| {
            PluginError::load(format!(
                "failed to parse JSON config {}: {e}",
                path.display()
            ))
        }),
    }
}
