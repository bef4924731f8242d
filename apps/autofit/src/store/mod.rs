//! Shared state store: the single mutable source of truth inside one context.
//!
//! `dispatch` runs the middleware chain, reduces the action into a new snapshot,
//! appends a bounded history record, then notifies topic subscribers with
//! `(dispatch, old, new)`. A failing or panicking subscriber is logged and skipped;
//! the remaining subscribers still run.
//!
//! There is no global instance: each context constructs its own `Store` and hands
//! `Arc<Store>` to its collaborators.

pub mod actions;
pub mod reducer;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::queue::RenderReason;

pub use actions::{Action, Topic};
pub use reducer::{reduce, RenderPhase, StoreState};

/// Maximum number of history records retained for debugging.
pub const HISTORY_LIMIT: usize = 50;

/// An action on its way through the store, annotated by middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub action: Action,
    /// Set by middleware when this action should schedule a render task.
    pub render_reason: Option<RenderReason>,
}

impl Dispatch {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            render_reason: None,
        }
    }
}

/// Intercepts (and may rewrite) an action before it reaches the reducer.
pub trait Middleware: Send + Sync {
    fn intercept(&self, dispatch: Dispatch, state: &StoreState) -> Dispatch;
}

pub type Subscriber =
    dyn Fn(&Dispatch, &StoreState, &StoreState) -> anyhow::Result<()> + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub action: &'static str,
    pub topic: Topic,
    pub render_reason: Option<RenderReason>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    topics: Vec<Topic>,
    callback: Arc<Subscriber>,
}

#[derive(Default)]
struct Inner {
    state: StoreState,
    history: VecDeque<HistoryRecord>,
}

#[derive(Default)]
pub struct Store {
    inner: Mutex<Inner>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    subscribers: RwLock<Vec<Subscription>>,
    next_subscription: Mutex<u64>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the end of the chain.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        write_lock(&self.middleware).push(middleware);
    }

    /// Registers `callback` for actions whose topic is in `topics`.
    pub fn subscribe<F>(&self, topics: &[Topic], callback: F) -> SubscriptionId
    where
        F: Fn(&Dispatch, &StoreState, &StoreState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = {
            let mut next = lock(&self.next_subscription);
            *next += 1;
            SubscriptionId(*next)
        };
        write_lock(&self.subscribers).push(Subscription {
            id,
            topics: topics.to_vec(),
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = write_lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Synchronously applies `action` and notifies subscribers before returning.
    pub fn dispatch(&self, action: Action) -> Dispatch {
        let mut dispatch = Dispatch::new(action);
        let chain: Vec<Arc<dyn Middleware>> = read_lock(&self.middleware).clone();
        if !chain.is_empty() {
            let current = self.snapshot();
            for middleware in chain {
                dispatch = middleware.intercept(dispatch, &current);
            }
        }

        let topic = dispatch.action.topic();
        let (old, new) = {
            let mut inner = lock(&self.inner);
            let old = inner.state.clone();
            let new = reduce(&old, &dispatch.action);
            inner.state = new.clone();
            if inner.history.len() == HISTORY_LIMIT {
                inner.history.pop_front();
            }
            inner.history.push_back(HistoryRecord {
                action: dispatch.action.name(),
                topic,
                render_reason: dispatch.render_reason,
                at: Utc::now(),
            });
            (old, new)
        };

        // Callbacks run outside every lock so they may dispatch or subscribe.
        let callbacks: Vec<(SubscriptionId, Arc<Subscriber>)> = read_lock(&self.subscribers)
            .iter()
            .filter(|s| s.topics.contains(&topic))
            .map(|s| (s.id, Arc::clone(&s.callback)))
            .collect();

        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(&dispatch, &old, &new))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    subscription = id.0,
                    action = dispatch.action.name(),
                    "Store subscriber failed: {e:#}"
                ),
                Err(_) => error!(
                    subscription = id.0,
                    action = dispatch.action.name(),
                    "Store subscriber panicked"
                ),
            }
        }

        dispatch
    }

    /// A deep copy of the current state.
    pub fn snapshot(&self) -> StoreState {
        lock(&self.inner).state.clone()
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        lock(&self.inner).history.iter().cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock<T>(rw: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(rw: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
