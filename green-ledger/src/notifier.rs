//! Balance change notification
//!
//! Every open view must converge on the same balance without polling storage.
//! Two channels cover the two audiences:
//!
//! - the in-process bus (`publish`) reaches subscribers of the view that wrote
//! - the substrate change feed reaches every other view; events written by the
//!   view itself are filtered out so nothing is delivered twice
//!
//! When a view falls more than the feed capacity behind, the skipped events are
//! replaced by one change from the last delivered balance to the stored one.

use crate::{
    persist::{parse_balance_text, BALANCE_KEY},
    storage::KeyValueStore,
    types::{BalanceChange, ViewId},
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

type Handler = Arc<dyn Fn(BalanceChange) + Send + Sync>;

#[derive(Default)]
struct NotifierInner {
    handlers: RwLock<BTreeMap<u64, Handler>>,
    next_id: AtomicU64,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

impl NotifierInner {
    fn dispatch(&self, change: BalanceChange) {
        // Snapshot so a handler may unsubscribe while being called
        let handlers: Vec<Handler> = self.handlers.read().values().cloned().collect();
        for handler in handlers {
            handler(change);
        }
    }
}

impl Drop for NotifierInner {
    fn drop(&mut self) {
        if let Some(task) = self.feed_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Per-view balance notifier
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChangeNotifier {
    /// Create a notifier with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it stays registered until the subscription is dropped
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(BalanceChange) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.write().insert(id, Arc::new(handler));

        Subscription {
            id,
            notifier: Arc::downgrade(&self.inner),
        }
    }

    /// Broadcast a balance change to this view's subscribers
    pub fn publish(&self, old_balance: u64, new_balance: u64) {
        let change = BalanceChange::new(old_balance, new_balance);
        tracing::debug!(old_balance, new_balance, "Publishing balance change");
        self.inner.dispatch(change);
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Forward balance writes made by other views to this view's subscribers
    ///
    /// Replaces any previously attached feed. The task holds the store weakly so
    /// it never keeps the substrate open.
    pub fn attach_storage_feed(&self, store: Arc<dyn KeyValueStore>, own_view: ViewId) {
        let notifier: Weak<NotifierInner> = Arc::downgrade(&self.inner);

        // Subscribe before reading so no write falls between the two
        let mut feed = store.watch();
        let mut last = stored_balance(store.as_ref()).unwrap_or(0);
        let store: Weak<dyn KeyValueStore> = Arc::downgrade(&store);

        let task = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        if event.key != BALANCE_KEY {
                            continue;
                        }

                        let new_balance =
                            parse_balance_text(event.new_value.as_deref()).unwrap_or(0);
                        let seen = std::mem::replace(&mut last, new_balance);
                        if event.origin == own_view || new_balance == seen {
                            continue;
                        }

                        let Some(inner) = notifier.upgrade() else {
                            break;
                        };

                        let change = BalanceChange::new(
                            parse_balance_text(event.old_value.as_deref()).unwrap_or(0),
                            new_balance,
                        );

                        tracing::debug!(
                            view = %own_view,
                            writer = %event.origin,
                            new_balance = change.new_balance,
                            "Balance changed in another view"
                        );

                        inner.dispatch(change);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(view = %own_view, skipped, "Change feed lagged");

                        let current = match store.upgrade() {
                            Some(store) => stored_balance(store.as_ref()),
                            None => break,
                        };
                        let Some(current) = current.filter(|current| *current != last) else {
                            continue;
                        };
                        let Some(inner) = notifier.upgrade() else {
                            break;
                        };

                        let change = BalanceChange::new(last, current);
                        last = current;
                        tracing::debug!(
                            view = %own_view,
                            new_balance = current,
                            "Balance resynchronized after lag"
                        );
                        inner.dispatch(change);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!(view = %own_view, "Change feed closed");
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.inner.feed_task.lock().replace(task) {
            previous.abort();
        }
    }
}

fn stored_balance(store: &dyn KeyValueStore) -> Option<u64> {
    match store.get(BALANCE_KEY) {
        Ok(raw) => Some(parse_balance_text(raw.as_deref()).unwrap_or(0)),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read stored balance");
            None
        }
    }
}

/// Registration handle returned by `ChangeNotifier::subscribe`
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    id: u64,
    notifier: Weak<NotifierInner>,
}

impl Subscription {
    /// Stop receiving notifications
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.notifier.upgrade() {
            inner.handlers.write().remove(&self.id);
        }
    }
}

#[derive(Debug, Default)]
struct BadgeState {
    balance: AtomicU64,
    rewards: AtomicU64,
}

/// Read-only balance display kept current by a notifier
#[derive(Debug)]
pub struct BalanceBadge {
    state: Arc<BadgeState>,
    _subscription: Subscription,
}

impl BalanceBadge {
    /// Show `initial_balance` and follow every change published to `notifier`
    pub fn attach(notifier: &ChangeNotifier, initial_balance: u64) -> Self {
        let state = Arc::new(BadgeState {
            balance: AtomicU64::new(initial_balance),
            rewards: AtomicU64::new(0),
        });

        let handler_state = Arc::clone(&state);
        let subscription = notifier.subscribe(move |change: BalanceChange| {
            handler_state
                .balance
                .store(change.new_balance, Ordering::SeqCst);
            if change.is_reward() {
                handler_state.rewards.fetch_add(1, Ordering::SeqCst);
            }
        });

        Self {
            state,
            _subscription: subscription,
        }
    }

    /// Displayed balance
    pub fn balance(&self) -> u64 {
        self.state.balance.load(Ordering::SeqCst)
    }

    /// How many reward animations were triggered
    pub fn reward_count(&self) -> u64 {
        self.state.rewards.load(Ordering::SeqCst)
    }

    /// Badge text, e.g. `₹1,250`
    pub fn label(&self) -> String {
        format!("₹{}", group_thousands(self.balance()))
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
