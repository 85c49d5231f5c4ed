//! Reactive state: an ordered property container that notifies subscribers
//! when a property actually changes.
//!
//! The change-detection rule is plain value inequality: writing a property to
//! the value it already holds is a no-op and never notifies. Notification is
//! synchronous and carries a reference to the whole state, not a diff; it is
//! the subscriber's job (in practice, the session's) to decide what to do
//! with it. This type knows nothing about rendering, sessions or transport.

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

/// Token returned by [`ReactiveState::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: u64,
    callback: Box<dyn Fn(&ReactiveState) + Send>,
}

/// An ordered set of named properties with change notification.
///
/// Owned exclusively by one view instance; mutated only from that view's
/// operation handlers or mount routine. Multiple subscribers are permitted at
/// this level even though the session layer attaches at most one listener.
#[derive(Default)]
pub struct ReactiveState {
    props: IndexMap<String, Value>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl ReactiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style initial population. Does not notify.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }

    /// Write a property. Notifies every subscriber if and only if the new
    /// value differs from the old one (a missing property counts as changed).
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.props.get(key) {
            Some(old) if *old == value => return,
            _ => {}
        }
        self.props.insert(key.to_string(), value);
        self.notify();
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.props.get(key).and_then(Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.props.get(key).and_then(Value::as_bool)
    }

    /// Register a change callback. The callback receives the whole state.
    pub fn subscribe(&mut self, callback: impl Fn(&ReactiveState) + Send + 'static) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        SubscriptionId(id)
    }

    /// Remove a previously registered callback. Unknown tokens are ignored.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|s| s.id != id.0);
    }

    /// Serialize the properties to a JSON object string, in insertion order.
    /// Used to embed a state snapshot in the rendered page
    /// (`data-live-state`).
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.props)
    }

    fn notify(&self) {
        for sub in &self.subscribers {
            (sub.callback)(self);
        }
    }
}

impl Serialize for ReactiveState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.props.serialize(serializer)
    }
}

impl std::fmt::Debug for ReactiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveState")
            .field("props", &self.props)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(state: &mut ReactiveState) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        state.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    #[test]
    fn notifies_on_change() {
        let mut state = ReactiveState::new().with("count", 0);
        let hits = counting(&mut state);

        state.set("count", 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.get_i64("count"), Some(1));
    }

    #[test]
    fn idempotent_write_does_not_notify() {
        let mut state = ReactiveState::new().with("count", 5);
        let hits = counting(&mut state);

        state.set("count", 5);
        state.set("count", 5);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        state.set("count", 6);
        state.set("count", 6);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn inserting_a_new_key_notifies() {
        let mut state = ReactiveState::new();
        let hits = counting(&mut state);

        state.set("name", "ada");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.get_str("name"), Some("ada"));
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let mut state = ReactiveState::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let token = state.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        state.set("a", 1);
        state.unsubscribe(token);
        state.set("a", 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_subscribers_each_notified() {
        let mut state = ReactiveState::new();
        let first = counting(&mut state);
        let second = counting(&mut state);

        state.set("x", true);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_sees_the_whole_state() {
        let mut state = ReactiveState::new().with("a", 1);
        let observed = Arc::new(AtomicUsize::new(0));
        let seen = observed.clone();
        state.subscribe(move |s| {
            seen.store(s.get_i64("b").unwrap_or(0) as usize, Ordering::SeqCst);
        });

        state.set("b", 42);
        assert_eq!(observed.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn encode_preserves_insertion_order() {
        let state = ReactiveState::new().with("b", 2).with("a", 1);
        assert_eq!(state.encode().unwrap(), r#"{"b":2,"a":1}"#);
    }
}
