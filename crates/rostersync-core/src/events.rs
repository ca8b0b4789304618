// Typed observer registration for roster changes and errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::member::{Member, MemberId};

/// Immutable copy of a roster handed to observers.
#[derive(Debug, Clone)]
pub struct RosterSnapshot<F> {
    pub roster: &'static str,
    pub members: Vec<Member<F>>,
    pub taken_at: DateTime<Utc>,
}

/// Error surfaced to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub roster: &'static str,
    pub error: SyncError,
    pub at: DateTime<Utc>,
}

/// Everything an engine publishes.
#[derive(Debug, Clone)]
pub enum RosterEvent<F> {
    /// Fired once per refresh that joined, removed or updated members.
    Changed(RosterSnapshot<F>),
    /// A joined member's enrichment was merged.
    Enriched {
        member_id: MemberId,
        snapshot: RosterSnapshot<F>,
    },
    Error(ErrorEvent),
}

impl<F> RosterEvent<F> {
    /// Label of the roster the event belongs to.
    pub fn roster(&self) -> &'static str {
        match self {
            RosterEvent::Changed(snapshot) => snapshot.roster,
            RosterEvent::Enriched { snapshot, .. } => snapshot.roster,
            RosterEvent::Error(e) => e.roster,
        }
    }
}

type ObserverMap<E> = HashMap<u64, mpsc::UnboundedSender<E>>;

struct Registry<E> {
    next_id: u64,
    observers: ObserverMap<E>,
}

/// Set of observers for one event stream.
///
/// Each `subscribe` returns the receiving end of a fresh channel together
/// with a [`Subscription`] that removes the observer when unsubscribed or
/// dropped. Observers whose receiver is gone are pruned on the next emit.
pub struct Observers<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: Clone> Observers<E> {
    pub fn new() -> Self {
        Observers {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                observers: HashMap::new(),
            })),
        }
    }

    pub fn subscribe(&self) -> (Subscription<E>, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.observers.insert(id, tx);
        let subscription = Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        };
        (subscription, rx)
    }

    /// Deliver `event` to every live observer.
    pub fn emit(&self, event: E) {
        let mut registry = lock(&self.registry);
        registry
            .observers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`Observers::subscribe`].
pub struct Subscription<E> {
    id: u64,
    registry: Weak<Mutex<Registry<E>>>,
}

impl<E> Subscription<E> {
    /// Stop receiving events. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}

    fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).observers.remove(&self.id);
        }
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn lock<E>(registry: &Mutex<Registry<E>>) -> MutexGuard<'_, Registry<E>> {
    registry.lock().expect("observer registry mutex poisoned")
}
