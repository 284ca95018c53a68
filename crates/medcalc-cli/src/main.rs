//! Build-time driver for the medcalc plugin runtime
//!
//! Runs discovery once against a plugin source tree and materializes a
//! static registry manifest, plus ad-hoc search and namespace listing for
//! inspecting a source tree during authoring.

use anyhow::Result;
use clap::{Parser, Subcommand};
use medcalc_calculator::ProviderRegistry;
use medcalc_core::{
    CalculatorRegistry, DiscoveryConfig, DiscoveryService, RegistryConfig, SearchQuery,
    SearchStrategyKind,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// medcalc plugin runtime driver
#[derive(Parser)]
#[command(name = "medcalc")]
#[command(about = "Discover, validate and search calculator plugins")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Plugin source root
    #[arg(short, long, default_value = "calculators")]
    root: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run discovery once and emit a static registry manifest
    Discover {
        /// Output file for the manifest (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit with an error code when any candidate fails
        #[arg(long)]
        strict: bool,
    },

    /// Search discovered plugins
    Search {
        /// Free-text query
        text: Option<String>,

        /// Matching strategy (exact, fuzzy, semantic)
        #[arg(short, long, default_value = "fuzzy")]
        strategy: String,

        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,

        /// Filter by tag (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,
    },

    /// List namespaces under the source root
    Namespaces,
}

/// One manifest row per registered plugin
#[derive(Serialize)]
struct ManifestEntry {
    key: String,
    version: String,
    name: String,
    category: String,
    tags: Vec<String>,
}

#[derive(Serialize)]
struct Manifest {
    runtime_version: String,
    plugins: Vec<ManifestEntry>,
    warnings: Vec<String>,
    failed: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "medcalc=debug,info" } else { "medcalc=info,warn" })
        .with_target(false)
        .init();

    let providers = Arc::new(ProviderRegistry::with_built_ins());
    let discovery = DiscoveryService::new(DiscoveryConfig::new(&cli.root), providers);
    let registry = CalculatorRegistry::new(RegistryConfig::default());

    match cli.command {
        Command::Discover { output, strict } => {
            let report = discovery.discover_all().await;
            for warning in &report.warnings {
                warn!("{warning}");
            }

            let mut entries = Vec::new();
            for result in &report.discovered {
                let Some(plugin) = &result.plugin else { continue };
                if let Err(error) = registry.register(plugin.clone()) {
                    warn!(key = %plugin.key(), "skipping plugin: {error}");
                    continue;
                }
                entries.push(ManifestEntry {
                    key: plugin.key(),
                    version: plugin.metadata.version.clone(),
                    name: plugin.display_name("en").to_string(),
                    category: plugin.config.category.clone(),
                    tags: plugin.metadata.tags.clone(),
                });
            }

            let manifest = Manifest {
                runtime_version: medcalc_core::RUNTIME_VERSION.to_string(),
                plugins: entries,
                warnings: report.warnings.clone(),
                failed: report
                    .failed
                    .iter()
                    .map(|r| r.error.clone().unwrap_or_default())
                    .collect(),
            };

            let rendered = serde_json::to_string_pretty(&manifest)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    info!(path = %path.display(), "manifest written");
                }
                None => println!("{rendered}"),
            }

            info!(
                discovered = report.stats.succeeded,
                failed = report.stats.failed,
                "discovery complete in {:.1}ms",
                report.stats.duration_ms
            );
            if strict && report.stats.failed > 0 {
                anyhow::bail!("{} plugin(s) failed discovery", report.stats.failed);
            }
        }

        Command::Search { text, strategy, category, tag } => {
            let report = discovery.discover_all().await;
            for result in &report.discovered {
                if let Some(plugin) = &result.plugin {
                    if let Err(error) = registry.register(plugin.clone()) {
                        warn!("{error}");
                    }
                }
            }

            let strategy = match strategy.as_str() {
                "exact" => SearchStrategyKind::Exact,
                "semantic" => SearchStrategyKind::Semantic,
                _ => SearchStrategyKind::Fuzzy,
            };
            let query = SearchQuery { text, strategy, category, tags: tag, ..Default::default() };
            for plugin in registry.search(&query) {
                println!(
                    "{}\t{}\t{}",
                    plugin.key(),
                    plugin.metadata.version,
                    plugin.display_name("en")
                );
            }
        }

        Command::Namespaces => {
            for namespace in discovery.list_namespaces().await {
                println!("{namespace}");
            }
        }
    }

    Ok(())
}
