//! Lifecycle notifications.
//!
//! The set of events is closed: configuration fragments arriving (`config`),
//! a load finishing (`done`), and driver faults that have no caller to report
//! to (`error`). Listeners subscribe to one [`EventKind`] and are called in
//! registration order.

use crate::error::{RepoPoolError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

/// Kind of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// One configuration fragment arrived from a provider
    Config,
    /// A load finished and was applied
    Done,
    /// A pool driver failed outside any caller's result
    Error,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [Self; 3] = [Self::Config, Self::Done, Self::Error];

    /// Wire name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = RepoPoolError;

    fn from_str(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(RepoPoolError::usage("event name must not be empty"));
        }

        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| {
                RepoPoolError::usage(format!(
                    "unknown event '{name}', expected one of: config, done, error"
                ))
            })
    }
}

/// A lifecycle event with its payload.
#[derive(Debug, Clone)]
pub enum Event {
    /// A configuration fragment as delivered by its provider
    Config(Value),
    /// The fully merged configuration that was applied
    Done(Value),
    /// A driver fault
    Error(Arc<RepoPoolError>),
}

impl Event {
    /// Kind of this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Config(_) => EventKind::Config,
            Self::Done(_) => EventKind::Done,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// Callback invoked for each delivered event.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Listener registry keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(EventKind, Listener)>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `kind`.
    pub fn subscribe(&self, kind: EventKind, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, listener));
    }

    /// Delivers `event` to every listener of its kind.
    ///
    /// Listeners are snapshotted first, so a listener may subscribe others
    /// without deadlocking; those only see later events.
    pub fn emit(&self, event: &Event) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        tracing::trace!(event = %kind, listeners = targets.len(), "Emitting event");
        for listener in targets {
            listener(event);
        }
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.listener_count(EventKind::Config))
            .field("done", &self.listener_count(EventKind::Done))
            .field("error", &self.listener_count(EventKind::Error))
            .finish()
    }
}
