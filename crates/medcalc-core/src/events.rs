//! Registry event bus
//!
//! Bounded observer set with panic isolation: a misbehaving observer is
//! logged and skipped, never allowed to block delivery to the rest.
//! Subscriptions are scoped acquisitions that unsubscribe on drop.

use crate::error::{PluginError, PluginResult};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::warn;

/// Events emitted by the registry
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    CalculatorAdded { key: String, version: String },
    CalculatorRemoved { key: String },
    IndexRebuilt { plugin_count: usize },
    SearchPerformed { strategy: &'static str, results: usize, duration: Duration },
}

impl RegistryEvent {
    /// Event type name for logging and telemetry sinks
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::CalculatorAdded { .. } => "calculator_added",
            RegistryEvent::CalculatorRemoved { .. } => "calculator_removed",
            RegistryEvent::IndexRebuilt { .. } => "index_rebuilt",
            RegistryEvent::SearchPerformed { .. } => "search_performed",
        }
    }
}

/// Callback invoked for every registry event
pub type Observer = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Bounded set of event observers
pub struct ObserverSet {
    max_observers: usize,
    observers: Mutex<Vec<(u64, Observer)>>,
    next_id: AtomicU64,
}

impl ObserverSet {
    pub fn new(max_observers: usize) -> Self {
        Self { max_observers, observers: Mutex::new(Vec::new()), next_id: AtomicU64::new(1) }
    }

    /// Register an observer, failing once the configured capacity is
    /// reached. Takes the owning `Arc` so the subscription can unsubscribe
    /// on drop without keeping the set alive.
    pub fn subscribe(set: &Arc<Self>, observer: Observer) -> PluginResult<Subscription> {
        let mut observers = set.observers.lock().unwrap();
        if observers.len() >= set.max_observers {
            return Err(PluginError::configuration(
                "max_observers",
                format!("observer limit of {} reached", set.max_observers),
            ));
        }
        let id = set.next_id.fetch_add(1, Ordering::Relaxed);
        observers.push((id, observer));
        Ok(Subscription { id, set: Arc::downgrade(set) })
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut observers = self.observers.lock().unwrap();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Deliver an event to every observer, isolating panics
    pub fn emit(&self, event: &RegistryEvent) {
        let snapshot: Vec<(u64, Observer)> = self.observers.lock().unwrap().clone();
        for (id, observer) in snapshot {
            let delivery = catch_unwind(AssertUnwindSafe(|| observer(event)));
            if delivery.is_err() {
                warn!(observer_id = id, event = event.kind(), "observer panicked; skipping");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.observers.lock().unwrap().clear();
    }
}

/// Scoped observer registration. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    set: Weak<ObserverSet>,
}

impl Subscription {
    /// Explicitly end the subscription (equivalent to dropping it)
    pub fn unsubscribe(self) {}

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.unsubscribe(self.id);
        }
    }
}
