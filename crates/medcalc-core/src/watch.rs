//! Development-time source watching
//!
//! Optional collaborator that invalidates the discovery cache when plugin
//! sources change on disk. Injectable and dev-only: production correctness
//! never depends on it.

use crate::discovery::DiscoveryService;
use crate::error::{PluginError, PluginResult};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use tracing::{debug, warn};

/// Watches the plugin source root and invalidates changed cache entries
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
}

impl SourceWatcher {
    /// Start watching the service's source root. The watcher stops when
    /// the returned handle is dropped.
    pub fn spawn(service: Arc<DiscoveryService>) -> PluginResult<Self> {
        let root = service.config().root.clone();
        let mut watcher = notify::recommended_watcher(
            move |event: Result<notify::Event, notify::Error>| match event {
                Ok(event) => {
                    for path in &event.paths {
                        debug!(path = %path.display(), "source change detected");
                        service.invalidate_path(path);
                    }
                }
                Err(error) => warn!(error = %error, "source watch error"),
            },
        )
        .map_err(|e| PluginError::configuration("watch", e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| PluginError::configuration("watch", e.to_string()))?;
        Ok(Self { _watcher: watcher })
    }
}
