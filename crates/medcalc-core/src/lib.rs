#![deny(warnings)]
//! Core runtime for the medcalc calculator plugin system.
//!
//! This crate implements plugin discovery, the process-wide registry with
//! pluggable search/sort/index strategies, the loader that binds plugins to
//! host containers as live instances, timeout-protected execution, and the
//! error classification and recovery pipeline. Failure isolation is the
//! organizing property: one misbehaving plugin never takes down discovery,
//! the registry, or a sibling instance.

use tracing::{debug, instrument};

/// Time-bounded caching for discovery results
pub mod cache;
/// Candidate scanning, validation and parallel loading
pub mod discovery;
/// Error taxonomy with category/severity accessors
pub mod error;
/// Registry event bus with bounded, panic-isolated observers
pub mod events;
/// Index strategies for derived lookup tables
pub mod index;
/// Live instance state machine, timeouts and metrics
pub mod instance;
/// Instance construction, caching and reload
pub mod loader;
/// Plugin descriptor model and shape validation
pub mod plugin;
/// Plugin catalogue, search and health surfaces
pub mod registry;
/// Error classification, reporting and bounded recovery
pub mod recovery;
/// Search strategies, sorting and pagination
pub mod search;
/// Dev-only filesystem watching (optional collaborator)
#[cfg(feature = "watch")]
pub mod watch;

// Re-export the public runtime surface
pub use discovery::{DiscoveryConfig, DiscoveryReport, DiscoveryService, LoadResult};
pub use error::{ErrorCategory, ErrorSeverity, PluginError, PluginResult};
pub use events::{RegistryEvent, Subscription};
pub use instance::{
    CalculatorInstance, HeadlessAdapter, InstanceCallbacks, InstanceMetrics, InstanceOptions,
    InstanceStatus, RenderAdapter,
};
pub use loader::{HostContainer, LoadOptions, LoaderConfig, PluginLoader};
pub use plugin::{
    CalculatorPlugin, FieldDef, FieldType, PluginConfig, PluginMetadata, RUNTIME_VERSION,
};
pub use recovery::{Classification, ErrorReporter, RecoveryOutcome, ReporterConfig, classify};
pub use registry::{
    CalculatorRegistry, Health, HealthIssue, HealthStatus, RegistryConfig, RegistryEntry,
    RegistryStats,
};
pub use search::{SearchQuery, SearchStrategyKind, SortStrategyKind};

/// Initialize the runtime's logging hooks
#[instrument]
pub fn init() -> anyhow::Result<()> {
    debug!("Initializing medcalc plugin runtime");
    Ok(())
}
