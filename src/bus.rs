//! In-process publish/subscribe channel for domain events.
//!
//! The bus is an explicit, constructed service: create one with
//! [`EventBus::new`], hand clones to every dashboard and emitter, and call
//! [`EventBus::dispose`] when the session ends. Delivery is synchronous:
//! by the time [`publish`](EventBus::publish) returns, every handler
//! registered for that event kind has run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::HandlerError;
use crate::event::{DomainEvent, Envelope, EventKind};
use crate::lock;

/// Result type returned by event handlers.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&Envelope) -> HandlerResult + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

struct Inner {
    handlers: Mutex<HashMap<EventKind, Vec<Entry>>>,
    next_id: AtomicU64,
    seq: AtomicU64,
    disposed: AtomicBool,
}

/// Process-wide (per session) domain event channel.
///
/// `Clone` is cheap: all clones share the same registration table.
///
/// # Delivery contract
///
/// - Handlers for the same [`EventKind`] run in registration order.
/// - No ordering is promised across different kinds.
/// - A handler that returns an error or panics is logged and skipped;
///   delivery continues with the next handler.
/// - Handlers see the registrations that existed when `publish` began.
///   Subscribing or unsubscribing from inside a handler takes effect on the
///   next publish.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                seq: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Registering the same closure twice creates two independent entries,
    /// each of which must be unsubscribed separately. Subscribing to a
    /// disposed bus returns an inert [`Subscription`].
    ///
    /// # Returns
    ///
    /// A [`Subscription`] that deregisters exactly this entry. Dropping it
    /// does **not** unsubscribe.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if self.is_disposed() {
            tracing::debug!(event = %kind, "subscribe on disposed bus ignored");
            return Subscription {
                bus: Weak::new(),
                kind,
                id,
                active: AtomicBool::new(false),
            };
        }

        lock(&self.inner.handlers)
            .entry(kind)
            .or_default()
            .push(Entry {
                id,
                handler: Arc::new(handler),
            });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `event` to every handler currently registered for its kind.
    ///
    /// Never fails: publishing with no subscribers, or on a disposed bus,
    /// is a no-op.
    pub fn publish(&self, event: DomainEvent) {
        if self.is_disposed() {
            tracing::debug!(event = event.name(), "publish on disposed bus dropped");
            return;
        }

        let kind = event.kind();
        // Snapshot the handler list so handlers can (un)subscribe without
        // deadlocking on the registration table.
        let targets: Vec<(u64, Handler)> = match lock(&self.inner.handlers).get(&kind) {
            Some(entries) => entries
                .iter()
                .map(|e| (e.id, Arc::clone(&e.handler)))
                .collect(),
            None => Vec::new(),
        };

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope::new(seq, event);
        tracing::debug!(
            event = %kind,
            seq,
            subscribers = targets.len(),
            "publishing event"
        );

        for (id, handler) in targets {
            match catch_unwind(AssertUnwindSafe(|| handler(&envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(
                        event = %kind,
                        subscription = id,
                        error = %e,
                        "event handler failed"
                    );
                }
                Err(panic) => {
                    tracing::error!(
                        event = %kind,
                        subscription = id,
                        error = %panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
    }

    /// Number of live registrations for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        lock(&self.inner.handlers).get(&kind).map_or(0, Vec::len)
    }

    /// Drop every registration and stop delivering events.
    ///
    /// Idempotent. Outstanding [`Subscription`]s become inert.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        lock(&self.inner.handlers).clear();
        tracing::debug!("event bus disposed");
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Registration handle returned by [`EventBus::subscribe`].
///
/// Holds only a weak reference to the bus, so an outstanding subscription
/// never keeps a disposed bus alive.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<Inner>,
    kind: EventKind,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Deregister this entry.
    ///
    /// Idempotent. Returns `true` only on the call that actually removed
    /// the handler.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let mut handlers = lock(&inner.handlers);
        let Some(entries) = handlers.get_mut(&self.kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != self.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            handlers.remove(&self.kind);
        }
        removed
    }

    /// The event kind this subscription was registered for.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
