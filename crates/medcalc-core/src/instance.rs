//! Live plugin instances
//!
//! One instance is one running copy of a plugin bound to a host container:
//! its own inputs, result, status machine and metrics. Calculations run
//! under timeout protection and a newer call supersedes the one in flight;
//! instances never see or touch each other's state.

use crate::error::{PluginError, PluginResult};
use crate::plugin::CalculatorPlugin;
use crate::recovery::ErrorReporter;
use chrono::{DateTime, Utc};
use medcalc_calculator::CalculatorInputs;
use medcalc_types::{CalculationOutcome, FieldValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};

/// Instance lifecycle states. `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Loading,
    Ready,
    Calculating,
    Error,
    Destroyed,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceStatus::Loading => "loading",
            InstanceStatus::Ready => "ready",
            InstanceStatus::Calculating => "calculating",
            InstanceStatus::Error => "error",
            InstanceStatus::Destroyed => "destroyed",
        };
        write!(f, "{}", name)
    }
}

/// Per-instance tuning knobs
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    pub calculation_timeout: Duration,
    pub validation_timeout: Duration,
    /// When set, render/calculation failures surface through `on_error`
    /// instead of propagating to the host
    pub error_boundary: bool,
    pub locale: String,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            calculation_timeout: Duration::from_secs(10),
            validation_timeout: Duration::from_secs(2),
            error_boundary: true,
            locale: "en".to_string(),
        }
    }
}

/// Per-instance execution metrics. The running average is recomputed
/// incrementally so memory stays bounded regardless of call volume.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct InstanceMetrics {
    pub load_time_ms: Option<f64>,
    pub calculation_count: u64,
    pub error_count: u64,
    pub avg_calculation_ms: f64,
    pub last_calculated_at: Option<DateTime<Utc>>,
}

/// Host callbacks wired by the loader
#[derive(Clone, Default)]
pub struct InstanceCallbacks {
    pub on_calculate: Option<Arc<dyn Fn(&CalculationOutcome) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&PluginError) + Send + Sync>>,
    pub on_loading_change: Option<Arc<dyn Fn(bool) + Send + Sync>>,
}

impl fmt::Debug for InstanceCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCallbacks")
            .field("on_calculate", &self.on_calculate.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_loading_change", &self.on_loading_change.is_some())
            .finish()
    }
}

impl InstanceCallbacks {
    fn loading(&self, value: bool) {
        if let Some(callback) = &self.on_loading_change {
            callback(value);
        }
    }

    fn calculated(&self, outcome: &CalculationOutcome) {
        if let Some(callback) = &self.on_calculate {
            callback(outcome);
        }
    }

    fn errored(&self, error: &PluginError) {
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }
}

/// Narrow host-rendering boundary. The core instance logic carries no
/// UI-framework dependency; the host supplies mount/unmount.
pub trait RenderAdapter: Send + Sync {
    fn mount(&self, plugin: &CalculatorPlugin, callbacks: &InstanceCallbacks) -> PluginResult<()>;
    fn unmount(&self);
}

/// Render adapter for hosts without a UI (tests, build-time drivers)
pub struct HeadlessAdapter;

impl RenderAdapter for HeadlessAdapter {
    fn mount(&self, _plugin: &CalculatorPlugin, _callbacks: &InstanceCallbacks) -> PluginResult<()> {
        Ok(())
    }

    fn unmount(&self) {}
}

#[derive(Debug)]
struct InstanceState {
    status: InstanceStatus,
    inputs: HashMap<String, FieldValue>,
    last_result: Option<CalculationOutcome>,
    metrics: InstanceMetrics,
}

/// Internal calculation failure modes
enum CalcFailure {
    /// A newer call took over, or the instance was destroyed mid-flight
    Superseded,
    Error(PluginError),
}

/// One running copy of a plugin bound to a host container
pub struct CalculatorInstance {
    plugin: Arc<CalculatorPlugin>,
    container_id: String,
    adapter: Arc<dyn RenderAdapter>,
    callbacks: InstanceCallbacks,
    options: InstanceOptions,
    reporter: Arc<ErrorReporter>,
    created: Instant,
    state: Mutex<InstanceState>,
    /// Bumped by every calculate call; stale epochs discard their results
    epoch: AtomicU64,
    cancel: Mutex<Option<Arc<Notify>>>,
}

impl fmt::Debug for CalculatorInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatorInstance")
            .field("plugin", &self.plugin.key())
            .field("container", &self.container_id)
            .field("status", &self.status())
            .finish()
    }
}

impl CalculatorInstance {
    pub fn new(
        plugin: Arc<CalculatorPlugin>,
        container_id: &str,
        adapter: Arc<dyn RenderAdapter>,
        callbacks: InstanceCallbacks,
        options: InstanceOptions,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            plugin,
            container_id: container_id.to_string(),
            adapter,
            callbacks,
            options,
            reporter,
            created: Instant::now(),
            state: Mutex::new(InstanceState {
                status: InstanceStatus::Loading,
                inputs: HashMap::new(),
                last_result: None,
                metrics: InstanceMetrics::default(),
            }),
            epoch: AtomicU64::new(0),
            cancel: Mutex::new(None),
        }
    }

    pub fn plugin(&self) -> &Arc<CalculatorPlugin> {
        &self.plugin
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn status(&self) -> InstanceStatus {
        self.state.lock().unwrap().status
    }

    pub fn metrics(&self) -> InstanceMetrics {
        self.state.lock().unwrap().metrics.clone()
    }

    pub fn last_result(&self) -> Option<CalculationOutcome> {
        self.state.lock().unwrap().last_result.clone()
    }

    pub fn inputs(&self) -> HashMap<String, FieldValue> {
        self.state.lock().unwrap().inputs.clone()
    }

    /// Mount this instance into its host container.
    ///
    /// Moves `loading -> ready` and records the load time. A mount failure
    /// transitions to `error`; with an error boundary configured it is
    /// reported instead of raised.
    #[instrument(skip(self), fields(plugin = %self.plugin.key(), container = %self.container_id))]
    pub fn render(&self) -> PluginResult<()> {
        if self.status() == InstanceStatus::Destroyed {
            return Err(self.destroyed_error("render"));
        }
        self.callbacks.loading(true);
        match self.adapter.mount(&self.plugin, &self.callbacks) {
            Ok(()) => {
                let mut state = self.state.lock().unwrap();
                if state.status != InstanceStatus::Destroyed {
                    state.status = InstanceStatus::Ready;
                    state.metrics.load_time_ms =
                        Some(self.created.elapsed().as_secs_f64() * 1000.0);
                }
                drop(state);
                self.callbacks.loading(false);
                Ok(())
            }
            Err(error) => {
                {
                    let mut state = self.state.lock().unwrap();
                    if state.status != InstanceStatus::Destroyed {
                        state.status = InstanceStatus::Error;
                        state.metrics.error_count += 1;
                    }
                }
                self.callbacks.loading(false);
                self.report(&error, "render");
                self.callbacks.errored(&error);
                if self.options.error_boundary { Ok(()) } else { Err(error) }
            }
        }
    }

    /// Run the plugin calculation for the given inputs.
    ///
    /// Validation and calculation each race a timeout; a timeout rejects
    /// with a `Timeout` error and returns the status to `ready`. A newer
    /// call supersedes the one in flight: the superseded result is
    /// discarded and never delivered to callbacks.
    #[instrument(skip(self, inputs), fields(plugin = %self.plugin.key(), container = %self.container_id))]
    pub async fn calculate(
        &self,
        inputs: HashMap<String, FieldValue>,
    ) -> PluginResult<CalculationOutcome> {
        let my_epoch = {
            let mut state = self.state.lock().unwrap();
            if state.status == InstanceStatus::Destroyed {
                return Err(self.destroyed_error("calculate"));
            }
            state.status = InstanceStatus::Calculating;
            state.inputs = inputs.clone();
            self.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        // Abort whatever was in flight before this call.
        let cancel = Arc::new(Notify::new());
        let previous = self.cancel.lock().unwrap().replace(cancel.clone());
        if let Some(previous) = previous {
            previous.notify_one();
        }
        self.callbacks.loading(true);

        let started = Instant::now();
        let outcome = self.run_stages(&inputs, &cancel).await;

        match outcome {
            Ok(result) => {
                if !self.commit_success(my_epoch, &result, started.elapsed()) {
                    return Err(self.superseded_error());
                }
                self.callbacks.loading(false);
                self.callbacks.calculated(&result);
                Ok(result)
            }
            Err(CalcFailure::Superseded) => Err(self.superseded_error()),
            Err(CalcFailure::Error(error)) => {
                if !self.commit_failure(my_epoch, &error) {
                    return Err(self.superseded_error());
                }
                self.callbacks.loading(false);
                self.report(&error, "calculate");
                self.callbacks.errored(&error);
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        inputs: &HashMap<String, FieldValue>,
        cancel: &Notify,
    ) -> Result<CalculationOutcome, CalcFailure> {
        let wrapped = CalculatorInputs::new(inputs);
        let metadata = &self.plugin.metadata;

        let validation = tokio::time::timeout(
            self.options.validation_timeout,
            self.plugin.calculator.validate(&wrapped),
        )
        .await;
        match validation {
            Err(_elapsed) => {
                return Err(CalcFailure::Error(PluginError::timeout(
                    &metadata.id,
                    &metadata.namespace,
                    "validate",
                    self.options.validation_timeout.as_millis() as u64,
                )));
            }
            Ok(report) if !report.is_valid => {
                let detail = report
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(CalcFailure::Error(PluginError::Validation {
                    message: format!("input validation failed: {detail}"),
                    plugin_id: Some(metadata.id.clone()),
                    field: report.errors.first().map(|e| e.field.clone()),
                }));
            }
            Ok(_) => {}
        }

        tokio::select! {
            biased;
            _ = cancel.notified() => {
                debug!("calculation cancelled by supersession or destroy");
                Err(CalcFailure::Superseded)
            }
            result = tokio::time::timeout(
                self.options.calculation_timeout,
                self.plugin.calculator.calculate(&wrapped),
            ) => match result {
                Err(_elapsed) => Err(CalcFailure::Error(PluginError::timeout(
                    &metadata.id,
                    &metadata.namespace,
                    "calculate",
                    self.options.calculation_timeout.as_millis() as u64,
                ))),
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(error)) => Err(CalcFailure::Error(PluginError::calculation(
                    &metadata.id,
                    "calculate",
                    error.to_string(),
                ))),
            }
        }
    }

    /// Record a successful calculation unless a newer call owns the state
    fn commit_success(
        &self,
        my_epoch: u64,
        result: &CalculationOutcome,
        elapsed: Duration,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        if self.epoch.load(Ordering::SeqCst) != my_epoch
            || state.status == InstanceStatus::Destroyed
        {
            return false;
        }
        state.status = InstanceStatus::Ready;
        state.last_result = Some(result.clone());
        let metrics = &mut state.metrics;
        metrics.calculation_count += 1;
        let sample_ms = elapsed.as_secs_f64() * 1000.0;
        metrics.avg_calculation_ms +=
            (sample_ms - metrics.avg_calculation_ms) / metrics.calculation_count as f64;
        metrics.last_calculated_at = Some(Utc::now());
        true
    }

    /// Record a failed calculation unless a newer call owns the state.
    /// Timeouts return the instance to `ready`; other failures park it in
    /// `error`.
    fn commit_failure(&self, my_epoch: u64, error: &PluginError) -> bool {
        let mut state = self.state.lock().unwrap();
        if self.epoch.load(Ordering::SeqCst) != my_epoch
            || state.status == InstanceStatus::Destroyed
        {
            return false;
        }
        state.metrics.error_count += 1;
        state.status = match error {
            PluginError::Timeout { .. } => InstanceStatus::Ready,
            _ => InstanceStatus::Error,
        };
        true
    }

    /// Merge updates into the stored inputs
    pub fn update_inputs(&self, updates: HashMap<String, FieldValue>) {
        let mut state = self.state.lock().unwrap();
        if state.status == InstanceStatus::Destroyed {
            return;
        }
        state.inputs.extend(updates);
    }

    /// Clear inputs and result, returning to `ready`
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status == InstanceStatus::Destroyed {
            return;
        }
        state.inputs.clear();
        state.last_result = None;
        state.status = InstanceStatus::Ready;
    }

    /// Unbind from the host and make this instance inert. Idempotent.
    pub fn destroy(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.status == InstanceStatus::Destroyed {
                return;
            }
            state.status = InstanceStatus::Destroyed;
        }
        if let Some(in_flight) = self.cancel.lock().unwrap().take() {
            in_flight.notify_one();
        }
        self.adapter.unmount();
        debug!(plugin = %self.plugin.key(), container = %self.container_id, "instance destroyed");
    }

    /// Render the last result for display, when one exists
    pub fn format_last_result(&self) -> Option<String> {
        let result = self.last_result()?;
        Some(self.plugin.calculator.format_result(&result, &self.options.locale))
    }

    fn report(&self, error: &PluginError, operation: &str) {
        let context = HashMap::from([
            ("container".to_string(), self.container_id.clone()),
            ("operation".to_string(), operation.to_string()),
        ]);
        self.reporter.report(error, Some(&self.plugin), context);
        warn!(plugin = %self.plugin.key(), operation = operation, error = %error, "instance operation failed");
    }

    fn destroyed_error(&self, operation: &str) -> PluginError {
        PluginError::calculation(
            &self.plugin.metadata.id,
            operation,
            "instance has been destroyed",
        )
    }

    fn superseded_error(&self) -> PluginError {
        PluginError::calculation(
            &self.plugin.metadata.id,
            "calculate",
            "superseded by a newer calculation",
        )
    }
}
