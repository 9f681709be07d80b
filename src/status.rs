//! Step lifecycle events and the bus that fans them out to observers.
//!
//! The bus is an explicit object: the hook runner creates one, hands clones to
//! every [`crate::step::StepExecutor`] and lets reporters subscribe to it.

use indexmap::IndexMap;
use serde::Serialize;
use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

/// Lifecycle of one step execution. `Running` always comes first and is
/// followed by exactly one of the terminal states.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumIs,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Skipped,
    Success,
    Failure,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub package_name: String,
    pub step_name: String,
    pub status: ExecutionStatus,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} › {}: {}",
            self.package_name, self.step_name, self.status
        )
    }
}

type Handler = Arc<dyn Fn(&StatusEvent) -> eyre::Result<()> + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: Mutex<IndexMap<u64, Handler>>,
}

/// Synchronous publish/subscribe channel for [`StatusEvent`]s.
///
/// Cloning is cheap and every clone shares the same subscribers. Events are
/// not retained: a subscriber only sees what is published after it subscribed.
#[derive(Clone, Default)]
pub struct StatusBus {
    inner: Arc<BusInner>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every current subscriber, in subscription order,
    /// before returning. A subscriber that errors or panics is logged and the
    /// remaining subscribers still receive the event.
    pub fn publish(&self, event: &StatusEvent) {
        // snapshot so handlers may subscribe/unsubscribe while being called
        let handlers = self
            .inner
            .handlers
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect::<Vec<_>>();
        trace!("publish {event} to {} subscriber(s)", handlers.len());
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("status subscriber failed on {event}: {err}"),
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    warn!("status subscriber panicked on {event}: {msg}");
                }
            }
        }
    }

    /// Registers `handler`. The handler stays subscribed until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    #[must_use = "dropping the subscription unsubscribes the handler"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&StatusEvent) -> eyre::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .unwrap()
            .insert(id, Arc::new(handler));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.lock().unwrap().len()
    }
}

impl fmt::Debug for StatusBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`StatusBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.handlers.lock().unwrap().shift_remove(&self.id);
        }
    }
}
