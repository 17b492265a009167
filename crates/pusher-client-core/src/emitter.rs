//! Event emitter shared by the connection, its channels and the facade.
//!
//! An [`EventEmitter`] maps event names to sets of listeners. Listeners are
//! reference-counted closures and are compared by identity, so binding the
//! same [`Listener`] twice under one event name keeps a single entry and it
//! is invoked once per broadcast.
//!
//! # Fault Isolation
//!
//! A panicking listener does not stop the broadcast. The panic is caught,
//! logged under the [`targets::EMITTER`](crate::logging::targets::EMITTER)
//! target, and the remaining listeners still run.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use pusher_client_core::{listener, EventEmitter};
//!
//! let emitter = EventEmitter::<i32>::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//! let hits_clone = hits.clone();
//! let counter = listener(move |_: Option<&i32>| {
//!     hits_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! emitter.bind("tick", &counter);
//! emitter.bind("tick", &counter); // already bound, ignored
//! emitter.broadcast("tick", Some(&1));
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::logging::targets;

/// A listener bound to an event name.
///
/// The payload is optional because protocol events may arrive without data.
/// Identity (the `Arc` allocation) is what [`EventEmitter::bind`] and
/// [`EventEmitter::unbind`] compare.
pub type Listener<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

/// Wrap a closure into a [`Listener`].
pub fn listener<T, F>(f: F) -> Listener<T>
where
    F: Fn(Option<&T>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Mapping from event name to a set of listeners.
///
/// All methods take `&self`; the listener table sits behind a mutex that is
/// released before any listener runs, so listeners may bind or unbind on the
/// same emitter while a broadcast is in progress.
pub struct EventEmitter<T> {
    listeners: Mutex<HashMap<String, Vec<Listener<T>>>>,
}

static_assertions::assert_impl_all!(EventEmitter<String>: Send, Sync);

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventEmitter<T> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register `listener` under `event`.
    ///
    /// Does nothing if this exact listener is already bound to `event`.
    pub fn bind(&self, event: &str, listener: &Listener<T>) {
        let mut listeners = self.listeners.lock();
        let set = listeners.entry(event.to_string()).or_default();
        if !set.iter().any(|existing| Arc::ptr_eq(existing, listener)) {
            set.push(listener.clone());
        }
    }

    /// Remove `listener` from `event`.
    ///
    /// Returns `true` if the listener was bound.
    pub fn unbind(&self, event: &str, listener: &Listener<T>) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(set) = listeners.get_mut(event) else {
            return false;
        };
        let before = set.len();
        set.retain(|existing| !Arc::ptr_eq(existing, listener));
        let removed = set.len() != before;
        if set.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Remove every listener bound to `event`.
    pub fn unbind_all(&self, event: &str) {
        self.listeners.lock().remove(event);
    }

    /// Number of listeners bound to `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    /// Invoke every listener currently bound to `event` with `data`.
    ///
    /// Returns the number of listeners invoked, panicking ones included.
    #[tracing::instrument(skip_all, target = "pusher_client_core::emitter", level = "trace", fields(event = event))]
    pub fn broadcast(&self, event: &str, data: Option<&T>) -> usize {
        let snapshot: Vec<Listener<T>> = match self.listeners.lock().get(event) {
            Some(set) => set.clone(),
            None => return 0,
        };
        tracing::trace!(target: targets::EMITTER, event, listener_count = snapshot.len(), "broadcasting");

        for listener in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(data))).is_err() {
                tracing::error!(target: targets::EMITTER, event, "listener panicked during broadcast");
            }
        }
        snapshot.len()
    }
}

impl<T> std::fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock();
        let mut events: Vec<&String> = listeners.keys().collect();
        events.sort();
        f.debug_struct("EventEmitter").field("events", &events).finish()
    }
}
