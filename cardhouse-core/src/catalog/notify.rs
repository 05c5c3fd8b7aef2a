//! Outbound notifications: user-facing messages, readiness observers and
//! load progress events.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::types::PackageDescriptor;

// ============================================================================
// Notifier
// ============================================================================

/// User-facing message channel.
///
/// `ask` and `prompt` suspend the calling operation until the user decides.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Shows an informational or error message.
    fn show(&self, message: &str);

    /// Binary decision. Returns `true` for yes.
    async fn ask(&self, message: &str) -> bool;

    /// Single-decision confirmation. Returns `true` if confirmed.
    async fn prompt(&self, message: &str) -> bool;
}

/// Headless notifier: logs messages and declines every question.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn show(&self, message: &str) {
        info!(target: "cardhouse::messages", "{}", message);
    }

    async fn ask(&self, message: &str) -> bool {
        warn!(target: "cardhouse::messages", "Declining question (no interactive user): {}", message);
        false
    }

    async fn prompt(&self, message: &str) -> bool {
        warn!(target: "cardhouse::messages", "Declining prompt (no interactive user): {}", message);
        false
    }
}

// ============================================================================
// Ready Observers
// ============================================================================

type ReadyCallback = Box<dyn Fn(&PackageDescriptor) + Send>;

#[derive(Default)]
struct ObserverSlots {
    next_id: u64,
    callbacks: BTreeMap<u64, ReadyCallback>,
}

/// Callbacks run each time the current package becomes ready.
///
/// Subscribing returns a [`Subscription`]; dropping it unregisters the
/// callback, so no dead entries accumulate.
#[derive(Default, Clone)]
pub struct ReadyObservers {
    slots: Arc<Mutex<ObserverSlots>>,
}

impl ReadyObservers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback. Keep the handle alive for as long as it should run.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PackageDescriptor) + Send + 'static,
    {
        let mut slots = self.lock();
        let id = slots.next_id;
        slots.next_id += 1;
        slots.callbacks.insert(id, Box::new(callback));

        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Invokes every live callback in registration order.
    pub fn notify(&self, descriptor: &PackageDescriptor) {
        let slots = self.lock();
        for callback in slots.callbacks.values() {
            callback(descriptor);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every callback; outstanding handles become no-ops.
    pub fn clear(&self) {
        self.lock().callbacks.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ObserverSlots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle for a registered ready callback.
pub struct Subscription {
    id: u64,
    slots: Weak<Mutex<ObserverSlots>>,
}

impl Subscription {
    /// Unregisters now instead of at drop.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            let mut slots = slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.callbacks.remove(&self.id);
        }
    }
}

// ============================================================================
// Load Events
// ============================================================================

/// One unit of content loading progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// A bulk card page finished (successfully or not).
    PageLoaded {
        package_id: String,
        page: u32,
        completed: u32,
        total: u32,
    },
    /// A lazily loaded set finished.
    SetLoaded {
        package_id: String,
        set_code: String,
    },
    /// Loading stopped early because of an error.
    Failed { package_id: String, error: String },
    /// All requested content is in place.
    Finished { package_id: String },
}

/// Sender for load events.
pub type LoadEventSender = mpsc::UnboundedSender<LoadEvent>;

/// Receiver for load events.
pub type LoadEventReceiver = mpsc::UnboundedReceiver<LoadEvent>;

/// Create a channel for streaming load progress.
pub fn load_event_channel() -> (LoadEventSender, LoadEventReceiver) {
    mpsc::unbounded_channel()
}
