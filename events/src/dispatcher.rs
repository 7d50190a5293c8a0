//! Delivery of realtime events to registered handlers.
//!
//! Handler lists are copy-on-write: registering or removing a handler swaps
//! in a new list, while a dispatch in progress keeps iterating the list it
//! snapshotted. That makes it safe for a handler to register or unregister
//! handlers (including itself) from inside `handle`.

use crate::event::RealtimeEvent;
use crate::handler::{EventHandler, HandlerKey};
use dashmap::DashMap;
use log::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Identifies one registration; the same handler registered twice gets two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Clone)]
struct Registration {
    id: HandlerId,
    handler: Arc<dyn EventHandler>,
}

/// Result of delivering one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers that were invoked, failed or not.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Multi-map of handlers keyed by event type plus the wildcard key.
pub struct Dispatcher {
    handlers: DashMap<HandlerKey, Arc<Vec<Registration>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler and return a [`Disposer`] that removes exactly this
    /// registration.
    ///
    /// A handler registered while a dispatch is running does not see the
    /// event currently being dispatched.
    pub fn on(
        self: &Arc<Self>,
        key: impl Into<HandlerKey>,
        handler: Arc<dyn EventHandler>,
    ) -> Disposer {
        let key = key.into();
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut entry = self.handlers.entry(key).or_default();
        Arc::make_mut(entry.value_mut()).push(Registration { id, handler });
        drop(entry);

        trace!("Registered handler {:?} for {}", id, key);

        Disposer {
            key,
            id,
            dispatcher: Arc::downgrade(self),
        }
    }

    /// Closure convenience for [`Dispatcher::on`].
    pub fn on_fn<F>(self: &Arc<Self>, key: impl Into<HandlerKey>, handler: F) -> Disposer
    where
        F: Fn(&RealtimeEvent) -> crate::handler::HandlerResult + Send + Sync + 'static,
    {
        self.on(key, Arc::new(handler))
    }

    /// Remove every registration of `handler` under `key`. Returns whether
    /// anything was removed.
    pub fn off(&self, key: impl Into<HandlerKey>, handler: &Arc<dyn EventHandler>) -> bool {
        self.remove_where(key.into(), |registration| {
            same_handler(&registration.handler, handler)
        })
    }

    /// Remove a single registration by id.
    pub fn remove(&self, key: impl Into<HandlerKey>, id: HandlerId) -> bool {
        self.remove_where(key.into(), |registration| registration.id == id)
    }

    fn remove_where<P>(&self, key: HandlerKey, predicate: P) -> bool
    where
        P: Fn(&Registration) -> bool,
    {
        let removed = match self.handlers.get_mut(&key) {
            Some(mut entry) => {
                let before = entry.len();
                if !entry.iter().any(&predicate) {
                    return false;
                }
                let list = Arc::make_mut(entry.value_mut());
                list.retain(|registration| !predicate(registration));
                before - list.len()
            }
            None => return false,
        };

        // Drop empty keys so handler_count and keys stay accurate.
        self.handlers.remove_if(&key, |_, list| list.is_empty());

        trace!("Removed {} handler(s) for {}", removed, key);
        removed > 0
    }

    /// Number of handlers registered under `key`.
    pub fn handler_count(&self, key: impl Into<HandlerKey>) -> usize {
        let key: HandlerKey = key.into();
        self.handlers
            .get(&key)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Remove every handler. Used on client teardown.
    pub fn clear(&self) {
        self.handlers.clear();
    }

    /// Deliver `event` to every handler registered for its exact type, then to
    /// every wildcard handler, each group in registration order.
    ///
    /// A handler that returns an error or panics is logged and skipped; the
    /// remaining handlers still run.
    pub fn dispatch(&self, event: &RealtimeEvent) -> DispatchOutcome {
        let exact = self.snapshot(HandlerKey::Type(event.event_type));
        let wildcard = self.snapshot(HandlerKey::Wildcard);

        let mut outcome = DispatchOutcome::default();
        for registration in exact.iter().chain(wildcard.iter()) {
            outcome.invoked += 1;
            if !invoke(registration, event) {
                outcome.failed += 1;
            }
        }

        trace!(
            "Dispatched {} ({}) to {} handler(s), {} failed",
            event.event_type,
            event.id,
            outcome.invoked,
            outcome.failed
        );
        outcome
    }

    fn snapshot(&self, key: HandlerKey) -> Arc<Vec<Registration>> {
        // The map guard is released before any handler runs.
        self.handlers
            .get(&key)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_default()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke(registration: &Registration, event: &RealtimeEvent) -> bool {
    match catch_unwind(AssertUnwindSafe(|| registration.handler.handle(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(
                "Handler {:?} failed for {} ({}): {e}",
                registration.id, event.event_type, event.id
            );
            false
        }
        Err(panic) => {
            error!(
                "Handler {:?} panicked for {} ({}): {}",
                registration.id,
                event.event_type,
                event.id,
                panic_message(panic.as_ref())
            );
            false
        }
    }
}

/// Readable text of a caught panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    // Compare data pointers only; vtable pointers are not unique.
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Removes the registration it was returned for.
///
/// Dropping a `Disposer` leaves the handler registered; call
/// [`Disposer::dispose`] to remove it. Disposing after the dispatcher is gone
/// is a no-op.
#[derive(Debug, Clone)]
pub struct Disposer {
    key: HandlerKey,
    id: HandlerId,
    dispatcher: Weak<Dispatcher>,
}

impl Disposer {
    pub fn dispose(&self) -> bool {
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.remove(self.key, self.id),
            None => false,
        }
    }
}
