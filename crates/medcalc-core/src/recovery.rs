//! Error classification, reporting and bounded recovery
//!
//! A cross-cutting service consulted whenever a runtime operation fails:
//! `classify` maps errors onto deterministic categories the host makes
//! retry/UX decisions from, `ErrorReporter` keeps the append-only report
//! log, and `attempt_recovery` runs category-specific strategies under a
//! per-plugin retry cap.

use crate::error::{ErrorCategory, ErrorSeverity, PluginError, PluginResult};
use crate::plugin::CalculatorPlugin;
use medcalc_calculator::CalculatorInputs;
use medcalc_types::FieldValue;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default ceiling on automatic recovery attempts per plugin and category
pub const MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Deterministic classification of a runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub recoverable: bool,
}

/// Classify an error. Pure over the error's type and message: equivalent
/// errors always classify identically.
pub fn classify(error: &PluginError) -> Classification {
    Classification {
        category: error.category(),
        severity: error.severity(),
        recoverable: error.is_recoverable(),
    }
}

/// One stored failure report. Append-only: `resolve` is the only mutation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorReport {
    pub id: String,
    pub message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub context: HashMap<String, String>,
    pub recoverable: bool,
    pub retry_count: u32,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// External delivery target for reports (production telemetry). Side
/// effect only; reporting never depends on it.
pub trait ReportSink: Send + Sync {
    fn deliver(&self, report: &ErrorReport);
}

/// Callback notified for every stored report
pub type ReportListener = Arc<dyn Fn(&ErrorReport) + Send + Sync>;

/// Reporter tuning knobs
#[derive(Clone)]
pub struct ReporterConfig {
    pub max_listeners: usize,
    pub max_recovery_attempts: u32,
    /// Window the timeout-recovery responsiveness probe runs under
    pub probe_timeout: Duration,
    pub sink: Option<Arc<dyn ReportSink>>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            max_listeners: 32,
            max_recovery_attempts: MAX_RECOVERY_ATTEMPTS,
            probe_timeout: Duration::from_secs(1),
            sink: None,
        }
    }
}

/// Outcome of a recovery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub message: String,
}

/// Aggregate report statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorStatistics {
    pub total: usize,
    pub unresolved: usize,
    pub by_category: HashMap<String, usize>,
    pub by_severity: HashMap<String, usize>,
}

/// The error reporting and recovery service
pub struct ErrorReporter {
    config: ReporterConfig,
    reports: Mutex<HashMap<String, ErrorReport>>,
    listeners: Mutex<Vec<(u64, ReportListener)>>,
    next_listener_id: AtomicU64,
    /// Recovery attempts per `(plugin, category)` signature
    retries: Mutex<HashMap<String, u32>>,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(ReporterConfig::default())
    }
}

impl ErrorReporter {
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            reports: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            retries: Mutex::new(HashMap::new()),
        }
    }

    /// Store and broadcast a report. Always succeeds: listener and sink
    /// failures are isolated and logged.
    pub fn report(
        &self,
        error: &PluginError,
        plugin: Option<&CalculatorPlugin>,
        mut context: HashMap<String, String>,
    ) -> ErrorReport {
        let classification = classify(error);
        if let Some(plugin) = plugin {
            context.insert("plugin".to_string(), plugin.key());
        }
        let retry_count = {
            let retries = self.retries.lock().unwrap();
            retries.get(&signature(error, plugin)).copied().unwrap_or(0)
        };
        let report = ErrorReport {
            id: Uuid::new_v4().to_string(),
            message: error.to_string(),
            category: classification.category,
            severity: classification.severity,
            context,
            recoverable: classification.recoverable,
            retry_count,
            resolved: false,
            created_at: Utc::now(),
        };

        self.reports.lock().unwrap().insert(report.id.clone(), report.clone());

        let listeners: Vec<(u64, ReportListener)> = self.listeners.lock().unwrap().clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&report))).is_err() {
                warn!(listener_id = id, "report listener panicked; skipping");
            }
        }
        if let Some(sink) = &self.config.sink {
            if catch_unwind(AssertUnwindSafe(|| sink.deliver(&report))).is_err() {
                warn!(report_id = %report.id, "report sink delivery failed");
            }
        }
        debug!(report_id = %report.id, category = %report.category, "error reported");
        report
    }

    /// Mark a report resolved. Returns false for unknown ids.
    pub fn resolve(&self, id: &str) -> bool {
        let mut reports = self.reports.lock().unwrap();
        match reports.get_mut(id) {
            Some(report) => {
                report.resolved = true;
                true
            }
            None => false,
        }
    }

    pub fn get_report(&self, id: &str) -> Option<ErrorReport> {
        self.reports.lock().unwrap().get(id).cloned()
    }

    pub fn get_statistics(&self) -> ErrorStatistics {
        let reports = self.reports.lock().unwrap();
        let mut by_category: HashMap<String, usize> = HashMap::new();
        let mut by_severity: HashMap<String, usize> = HashMap::new();
        let mut unresolved = 0;
        for report in reports.values() {
            *by_category.entry(report.category.to_string()).or_default() += 1;
            *by_severity.entry(report.severity.to_string()).or_default() += 1;
            if !report.resolved {
                unresolved += 1;
            }
        }
        ErrorStatistics { total: reports.len(), unresolved, by_category, by_severity }
    }

    /// Register a report listener, bounded by `max_listeners`
    pub fn add_listener(&self, listener: ReportListener) -> PluginResult<u64> {
        let mut listeners = self.listeners.lock().unwrap();
        if listeners.len() >= self.config.max_listeners {
            return Err(PluginError::configuration(
                "max_listeners",
                format!("listener limit of {} reached", self.config.max_listeners),
            ));
        }
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        listeners.push((id, listener));
        Ok(id)
    }

    pub fn remove_listener(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Drop all reports and retry counters. Test isolation.
    pub fn clear(&self) {
        self.reports.lock().unwrap().clear();
        self.retries.lock().unwrap().clear();
    }

    /// Attempt automatic recovery for an error.
    ///
    /// Attempts per `(plugin, category)` signature are capped; once the cap
    /// is exceeded further calls short-circuit without side effects. Each
    /// strategy leaves the plugin in a well-defined state whether or not it
    /// succeeds.
    pub async fn attempt_recovery(
        &self,
        error: &PluginError,
        plugin: Option<&CalculatorPlugin>,
        _context: HashMap<String, String>,
    ) -> RecoveryOutcome {
        let classification = classify(error);
        let key = signature(error, plugin);
        {
            let mut retries = self.retries.lock().unwrap();
            let attempts = retries.entry(key.clone()).or_insert(0);
            if *attempts >= self.config.max_recovery_attempts {
                return RecoveryOutcome {
                    success: false,
                    message: format!(
                        "maximum retry attempts reached ({})",
                        self.config.max_recovery_attempts
                    ),
                };
            }
            *attempts += 1;
        }

        let outcome = match classification.category {
            ErrorCategory::Timeout => self.recover_timeout(plugin).await,
            ErrorCategory::Dependency => self.recover_dependency(plugin).await,
            ErrorCategory::Load => self.recover_load(plugin).await,
            other => RecoveryOutcome {
                success: false,
                message: format!("no recovery strategy for category '{other}'"),
            },
        };

        if outcome.success {
            self.retries.lock().unwrap().remove(&key);
            info!(signature = %key, "recovery succeeded");
        } else {
            debug!(signature = %key, message = %outcome.message, "recovery failed");
        }
        outcome
    }

    /// Timeout strategy: re-probe plugin responsiveness under a short
    /// timeout. Any answer, including an error, counts as responsive.
    async fn recover_timeout(&self, plugin: Option<&CalculatorPlugin>) -> RecoveryOutcome {
        let Some(plugin) = plugin else {
            return no_plugin_context();
        };
        let empty: HashMap<String, FieldValue> = HashMap::new();
        let probe = CalculatorInputs::new(&empty);
        match tokio::time::timeout(self.config.probe_timeout, plugin.calculator.calculate(&probe))
            .await
        {
            Ok(_) => RecoveryOutcome {
                success: true,
                message: "plugin responded to responsiveness probe".to_string(),
            },
            Err(_elapsed) => RecoveryOutcome {
                success: false,
                message: format!(
                    "plugin did not respond within {}ms",
                    self.config.probe_timeout.as_millis()
                ),
            },
        }
    }

    /// Dependency strategy: re-run the plugin self-check
    async fn recover_dependency(&self, plugin: Option<&CalculatorPlugin>) -> RecoveryOutcome {
        let Some(plugin) = plugin else {
            return no_plugin_context();
        };
        match plugin.calculator.self_check().await {
            Ok(()) => RecoveryOutcome {
                success: true,
                message: "plugin self-check passed".to_string(),
            },
            Err(error) => RecoveryOutcome {
                success: false,
                message: format!("plugin self-check failed: {error}"),
            },
        }
    }

    /// Load strategy: uninstall, reinstall, then re-validate
    async fn recover_load(&self, plugin: Option<&CalculatorPlugin>) -> RecoveryOutcome {
        let Some(plugin) = plugin else {
            return no_plugin_context();
        };
        let calculator = &plugin.calculator;
        let reinstall = async {
            calculator.uninstall().await?;
            calculator.install().await?;
            calculator.self_check().await
        };
        match reinstall.await {
            Ok(()) => RecoveryOutcome {
                success: true,
                message: "plugin reinstalled and validated".to_string(),
            },
            Err(error) => RecoveryOutcome {
                success: false,
                message: format!("plugin reinstall failed: {error}"),
            },
        }
    }
}

fn no_plugin_context() -> RecoveryOutcome {
    RecoveryOutcome { success: false, message: "no plugin context for recovery".to_string() }
}

/// Retry-counter key per plugin and error category
fn signature(error: &PluginError, plugin: Option<&CalculatorPlugin>) -> String {
    let plugin_key = plugin
        .map(|p| p.key())
        .or_else(|| error.plugin_id().map(|id| id.to_string()))
        .unwrap_or_else(|| "-".to_string());
    format!("{plugin_key}:{}", error.category())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_pure_over_equivalent_errors() {
        let a = PluginError::timeout("bmi", "general", "calculate", 10_000);
        let b = PluginError::timeout("bmi", "general", "calculate", 10_000);
        assert_eq!(classify(&a), classify(&b));
    }

    #[test]
    fn signature_prefers_explicit_plugin_context() {
        let error = PluginError::timeout("bmi", "general", "calculate", 10_000);
        assert_eq!(signature(&error, None), "bmi:timeout");
    }

    #[test]
    fn resolve_is_the_only_report_mutation() {
        let reporter = ErrorReporter::default();
        let report =
            reporter.report(&PluginError::validation("bad input"), None, HashMap::new());
        assert!(!reporter.get_report(&report.id).unwrap().resolved);
        assert!(reporter.resolve(&report.id));
        assert!(reporter.get_report(&report.id).unwrap().resolved);
        assert!(!reporter.resolve("no-such-id"));
    }
}
