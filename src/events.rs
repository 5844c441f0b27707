//! Per-scope event listener registry.
//!
//! Every [`Connection`](crate::Connection) and every
//! [`Session`](crate::Session) owns one [`EventRegistry`]. Events routed to a
//! scope are emitted on its registry only.
//!
//! # Semantics
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | `on` | registers a persistent listener; a duplicate pair is a no-op |
//! | `once` | registers a listener removed right before its first invocation |
//! | `off` | removes a listener; unknown pairs are a no-op |
//! | `emit` | invokes listeners in registration order, returns how many ran |
//!
//! Emission works on a snapshot taken when it starts: listeners added during
//! an emission wait for the next one, listeners removed during an emission
//! are skipped. A panicking listener is logged and does not stop delivery to
//! the others.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{trace, warn};

// ============================================================================
// Listener
// ============================================================================

/// A cloneable event callback.
///
/// Identity is the identity of the wrapped allocation: clones of one
/// `Listener` are the same listener, two `Listener::new` calls never are.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(&Value) + Send + Sync>);

impl Listener {
    /// Wraps a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Returns `true` if both handles refer to the same listener.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }

    #[inline]
    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0).cast::<()>()
    }

    #[inline]
    fn call(&self, payload: &Value) {
        (self.0)(payload);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.addr()).finish()
    }
}

// ============================================================================
// Types
// ============================================================================

struct Entry {
    /// Unique per registration; tells a re-added listener apart.
    token: u64,
    listener: Listener,
    once: bool,
}

type EntryMap = FxHashMap<String, Vec<Entry>>;

// ============================================================================
// EventRegistry
// ============================================================================

/// Map from event name to an ordered list of listeners.
#[derive(Default)]
pub struct EventRegistry {
    entries: Mutex<EntryMap>,
    next_token: AtomicU64,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.event_names())
            .finish_non_exhaustive()
    }
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a persistent listener.
    ///
    /// Returns `false` if the pair was already registered.
    pub fn on(&self, name: &str, listener: &Listener) -> bool {
        self.insert(name, listener, false)
    }

    /// Registers a listener that runs at most once.
    ///
    /// Returns `false` if the pair was already registered.
    pub fn once(&self, name: &str, listener: &Listener) -> bool {
        self.insert(name, listener, true)
    }

    /// Removes a listener.
    ///
    /// Returns `false` if the pair was not registered.
    pub fn off(&self, name: &str, listener: &Listener) -> bool {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(name) else {
            return false;
        };

        let before = list.len();
        list.retain(|entry| !entry.listener.same(listener));
        let removed = list.len() != before;

        if list.is_empty() {
            entries.remove(name);
        }
        removed
    }

    /// Invokes every listener registered for `name` with `payload`.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, name: &str, payload: &Value) -> usize {
        let snapshot: Vec<(u64, Listener, bool)> = match self.entries.lock().get(name) {
            Some(list) => list
                .iter()
                .map(|entry| (entry.token, entry.listener.clone(), entry.once))
                .collect(),
            None => return 0,
        };

        let mut invoked = 0;

        for (token, listener, once) in snapshot {
            if !self.claim(name, token, once) {
                continue;
            }

            if catch_unwind(AssertUnwindSafe(|| listener.call(payload))).is_err() {
                warn!(event = name, "Event listener panicked");
            }
            invoked += 1;
        }

        trace!(event = name, invoked, "Event emitted");
        invoked
    }

    /// Returns a receiver completed with the payload of the next `name`
    /// event.
    ///
    /// The receiver errors if the registry is cleared first.
    pub fn wait_for(&self, name: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        let listener = Listener::new(move |payload| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(payload.clone());
            }
        });
        self.once(name, &listener);

        rx
    }

    /// Returns the number of listeners registered for `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.entries.lock().get(name).map_or(0, Vec::len)
    }

    /// Returns `true` if the pair is registered.
    #[must_use]
    pub fn has_listener(&self, name: &str, listener: &Listener) -> bool {
        self.entries
            .lock()
            .get(name)
            .is_some_and(|list| list.iter().any(|entry| entry.listener.same(listener)))
    }

    /// Returns `true` if any listener is registered for `name`.
    #[must_use]
    pub fn has_listeners(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Returns every event name with at least one listener.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Removes every listener for `name`, returning how many were removed.
    pub fn remove_all(&self, name: &str) -> usize {
        self.entries.lock().remove(name).map_or(0, |list| list.len())
    }

    /// Removes every listener.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.entries.lock());
        drop(drained);
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn insert(&self, name: &str, listener: &Listener, once: bool) -> bool {
        let mut entries = self.entries.lock();
        let list = entries.entry(name.to_string()).or_default();

        if list.iter().any(|entry| entry.listener.same(listener)) {
            return false;
        }

        list.push(Entry {
            token: self.next_token.fetch_add(1, Ordering::Relaxed),
            listener: listener.clone(),
            once,
        });
        true
    }

    /// Confirms a snapshot entry is still registered, removing it if it
    /// is a once-listener. Only one emitter can claim a once-listener.
    fn claim(&self, name: &str, token: u64, once: bool) -> bool {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(name) else {
            return false;
        };
        let Some(pos) = list.iter().position(|entry| entry.token == token) else {
            return false;
        };

        if once {
            list.remove(pos);
            if list.is_empty() {
                entries.remove(name);
            }
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    fn counter() -> (Listener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let listener = Listener::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[test]
    fn test_on_is_idempotent() {
        let registry = EventRegistry::new();
        let (listener, count) = counter();

        assert!(registry.on("Page.loadEventFired", &listener));
        assert!(!registry.on("Page.loadEventFired", &listener));
        assert_eq!(registry.listener_count("Page.loadEventFired"), 1);

        assert_eq!(registry.emit("Page.loadEventFired", &json!({})), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_identity() {
        let (listener, _) = counter();
        let (other, _) = counter();

        assert!(listener.same(&listener.clone()));
        assert!(!listener.same(&other));
    }

    #[test]
    fn test_once_runs_exactly_once() {
        let registry = EventRegistry::new();
        let (listener, count) = counter();

        registry.once("Network.requestWillBeSent", &listener);
        registry.emit("Network.requestWillBeSent", &json!({}));
        registry.emit("Network.requestWillBeSent", &json!({}));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!registry.has_listeners("Network.requestWillBeSent"));
    }

    #[test]
    fn test_off_unknown_is_noop() {
        let registry = EventRegistry::new();
        let (listener, _) = counter();

        assert!(!registry.off("Page.frameNavigated", &listener));
        registry.on("Page.frameNavigated", &listener);
        assert!(registry.off("Page.frameNavigated", &listener));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_emit_in_registration_order() {
        let registry = EventRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            registry.on("E", &Listener::new(move |_| order.lock().push(i)));
        }

        registry.emit("E", &Value::Null);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_listener_added_during_emit_waits_for_next() {
        let registry = Arc::new(EventRegistry::new());
        let (late, late_count) = counter();

        let registry_ref = Arc::clone(&registry);
        registry.on(
            "E",
            &Listener::new(move |_| {
                registry_ref.on("E", &late);
            }),
        );

        assert_eq!(registry.emit("E", &Value::Null), 1);
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        assert_eq!(registry.emit("E", &Value::Null), 2);
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_removed_during_emit_is_skipped() {
        let registry = Arc::new(EventRegistry::new());
        let (victim, victim_count) = counter();

        let registry_ref = Arc::clone(&registry);
        let victim_ref = victim.clone();
        registry.on(
            "E",
            &Listener::new(move |_| {
                registry_ref.off("E", &victim_ref);
            }),
        );
        registry.on("E", &victim);

        assert_eq!(registry.emit("E", &Value::Null), 1);
        assert_eq!(victim_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let registry = EventRegistry::new();
        let (after, after_count) = counter();

        registry.on("E", &Listener::new(|_| panic!("listener failure")));
        registry.on("E", &after);

        assert_eq!(registry.emit("E", &Value::Null), 2);
        assert_eq!(after_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_payload_is_delivered() {
        let registry = EventRegistry::new();
        let seen = Arc::new(Mutex::new(None));

        let seen_ref = Arc::clone(&seen);
        registry.on(
            "Page.loadEventFired",
            &Listener::new(move |payload| *seen_ref.lock() = Some(payload.clone())),
        );
        registry.emit("Page.loadEventFired", &json!({"timestamp": 12.5}));

        assert_eq!(*seen.lock(), Some(json!({"timestamp": 12.5})));
    }

    #[test]
    fn test_wait_for_resolves_with_payload() {
        let registry = EventRegistry::new();
        let mut wait = tokio_test::task::spawn(registry.wait_for("Target.targetCreated"));

        tokio_test::assert_pending!(wait.poll());

        registry.emit("Target.targetCreated", &json!({"targetId": "T"}));
        assert!(wait.is_woken());

        let payload = tokio_test::assert_ready_ok!(wait.poll());
        assert_eq!(payload, json!({"targetId": "T"}));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_errors_when_cleared() {
        let registry = EventRegistry::new();
        let rx = registry.wait_for("Target.targetCreated");

        registry.clear();
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_multimap_surface() {
        let registry = EventRegistry::new();
        let (a, _) = counter();
        let (b, _) = counter();

        registry.on("B", &a);
        registry.on("A", &a);
        registry.on("A", &b);

        assert!(registry.has_listener("A", &b));
        assert!(!registry.has_listener("B", &b));
        assert_eq!(registry.event_names(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(registry.remove_all("A"), 2);
        assert_eq!(registry.event_names(), vec!["B".to_string()]);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_emits_claim_once_listener_once() {
        let registry = Arc::new(EventRegistry::new());
        let (listener, count) = counter();
        registry.once("E", &listener);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.emit("E", &Value::Null))
            })
            .collect();
        let total: usize = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .sum();

        assert_eq!(total, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    mod proptests {
        use super::*;

        use std::collections::BTreeSet;

        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            On(usize),
            Off(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![(0..4usize).prop_map(Op::On), (0..4usize).prop_map(Op::Off)]
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

            #[test]
            fn registry_matches_set_model(ops in proptest::collection::vec(op(), 0..40)) {
                let registry = EventRegistry::new();
                let listeners: Vec<Listener> = (0..4).map(|_| Listener::new(|_| {})).collect();
                let mut model = BTreeSet::new();

                for op in ops {
                    match op {
                        Op::On(i) => {
                            prop_assert_eq!(registry.on("E", &listeners[i]), model.insert(i));
                        }
                        Op::Off(i) => {
                            prop_assert_eq!(registry.off("E", &listeners[i]), model.remove(&i));
                        }
                    }
                }

                prop_assert_eq!(registry.listener_count("E"), model.len());
                prop_assert_eq!(registry.emit("E", &Value::Null), model.len());
            }
        }
    }
}
