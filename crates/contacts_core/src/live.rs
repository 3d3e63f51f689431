//! Live views over the contacts table.
//!
//! # Responsibility
//! - Track subscribers interested in a [`ContactQuery`] result.
//! - Re-run each distinct query after committed mutations and push the new
//!   rows to every active subscriber of that query.
//!
//! # Invariants
//! - A new subscriber receives its initial result before any refresh result.
//! - Only one thread delivers at a time; a mutation committed while another
//!   thread is delivering is picked up by that thread before it returns, so
//!   the last delivery always reflects the last commit.
//! - After [`Subscription::cancel`] returns, no new delivery starts for that
//!   subscriber.
//! - Callbacks may call back into the store (including mutations and new
//!   subscriptions) without deadlocking.

use crate::model::contact::Contact;
use crate::repo::contact_repo::{ContactQuery, StoreResult};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};

/// Subscriber sink. Returns `false` to be dropped from the registry.
type Sink = Box<dyn Fn(&[Contact]) -> bool + Send + Sync>;

struct Subscriber {
    query: ContactQuery,
    sink: Sink,
    active: AtomicBool,
    needs_initial: AtomicBool,
}

/// Registry of live-view subscribers.
#[derive(Default)]
pub struct LiveQueryRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, Arc<Subscriber>>>,
    delivery: Mutex<()>,
    dirty: AtomicBool,
    refresh_all: AtomicBool,
}

impl LiveQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink for `query`. The initial result is delivered on the
    /// next [`Self::flush`].
    pub(crate) fn register(self: &Arc<Self>, query: ContactQuery, sink: Sink) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let subscriber = Arc::new(Subscriber {
            query,
            sink,
            active: AtomicBool::new(true),
            needs_initial: AtomicBool::new(true),
        });
        self.lock_subscribers().insert(id, subscriber);
        self.dirty.store(true, Ordering::SeqCst);
        debug!("event=live_subscribe module=live status=ok subscription_id={id}");

        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Marks every subscriber stale after a committed mutation.
    pub(crate) fn mark_table_changed(&self) {
        self.refresh_all.store(true, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Delivers pending results, re-running `run_query` once per distinct
    /// query.
    ///
    /// Returns immediately when another flush is in progress; that flush
    /// observes the pending work before it releases the delivery lock.
    pub(crate) fn flush(&self, run_query: impl Fn(&ContactQuery) -> StoreResult<Vec<Contact>>) {
        loop {
            let guard = match self.delivery.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            while self.dirty.swap(false, Ordering::SeqCst) {
                let refresh_all = self.refresh_all.swap(false, Ordering::SeqCst);
                self.deliver(refresh_all, &run_query);
            }
            drop(guard);

            if !self.dirty.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.lock_subscribers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_subscribers().is_empty()
    }

    fn deliver(
        &self,
        refresh_all: bool,
        run_query: &impl Fn(&ContactQuery) -> StoreResult<Vec<Contact>>,
    ) {
        let snapshot = self
            .lock_subscribers()
            .iter()
            .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
            .collect::<Vec<_>>();

        let mut results: HashMap<ContactQuery, Option<Vec<Contact>>> = HashMap::new();
        let mut rejected = Vec::new();

        for (id, subscriber) in snapshot {
            let wants_initial = subscriber.needs_initial.swap(false, Ordering::SeqCst);
            if !(refresh_all || wants_initial) {
                continue;
            }

            let rows = results
                .entry(subscriber.query.clone())
                .or_insert_with(|| match run_query(&subscriber.query) {
                    Ok(rows) => Some(rows),
                    Err(err) => {
                        warn!(
                            "event=live_refresh module=live status=error error_code=query_failed error={err}"
                        );
                        None
                    }
                });
            let Some(rows) = rows.as_ref() else {
                continue;
            };

            if !subscriber.active.load(Ordering::SeqCst) {
                continue;
            }
            if !(subscriber.sink)(rows) {
                rejected.push(id);
            }
        }

        if !rejected.is_empty() {
            let mut subscribers = self.lock_subscribers();
            for id in rejected {
                if let Some(subscriber) = subscribers.remove(&id) {
                    subscriber.active.store(false, Ordering::SeqCst);
                }
                debug!("event=live_unsubscribe module=live status=ok subscription_id={id} reason=sink_closed");
            }
        }
    }

    fn remove(&self, id: u64) {
        if let Some(subscriber) = self.lock_subscribers().remove(&id) {
            subscriber.active.store(false, Ordering::SeqCst);
            debug!("event=live_unsubscribe module=live status=ok subscription_id={id} reason=cancelled");
        }
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<Subscriber>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one live view. Dropping it cancels the subscription.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<LiveQueryRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops further deliveries and releases the subscriber.
    pub fn cancel(self) {
        drop(self);
    }

    /// Returns whether the subscriber is still registered.
    pub fn is_active(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let active = registry.lock_subscribers().contains_key(&self.id);
        active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

pub(crate) fn callback_sink(callback: impl Fn(&[Contact]) + Send + Sync + 'static) -> Sink {
    Box::new(move |rows| {
        callback(rows);
        true
    })
}

pub(crate) fn channel_sink(sender: std::sync::mpsc::Sender<Vec<Contact>>) -> Sink {
    Box::new(move |rows| sender.send(rows.to_vec()).is_ok())
}

#[cfg(test)]
mod tests {
    use super::{callback_sink, LiveQueryRegistry};
    use crate::model::contact::Contact;
    use crate::repo::contact_repo::ContactQuery;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    #[test]
    fn initial_delivery_only_reaches_new_subscriber() {
        let registry = Arc::new(LiveQueryRegistry::new());
        let first_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&first_calls);
        let _first = registry.register(
            ContactQuery::All,
            callback_sink(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        registry.flush(|_| Ok(Vec::new()));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);

        let (tx, rx) = mpsc::channel();
        let _second = registry.register(ContactQuery::Favorites, super::channel_sink(tx));
        registry.flush(|_| Ok(vec![Contact::new("Ada", "1")]));

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_recv().unwrap().len(), 1);
    }

    #[test]
    fn distinct_queries_run_once_per_refresh() {
        let registry = Arc::new(LiveQueryRegistry::new());
        let _a = registry.register(ContactQuery::All, callback_sink(|_| {}));
        let _b = registry.register(ContactQuery::All, callback_sink(|_| {}));
        let _c = registry.register(ContactQuery::Favorites, callback_sink(|_| {}));
        registry.flush(|_| Ok(Vec::new()));

        let runs = AtomicUsize::new(0);
        registry.mark_table_changed();
        registry.flush(|_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropped_receiver_prunes_subscriber() {
        let registry = Arc::new(LiveQueryRegistry::new());
        let (tx, rx) = mpsc::channel();
        let subscription = registry.register(ContactQuery::All, super::channel_sink(tx));
        drop(rx);

        registry.flush(|_| Ok(Vec::new()));
        assert!(registry.is_empty());
        assert!(!subscription.is_active());
    }

    #[test]
    fn cancel_removes_subscriber() {
        let registry = Arc::new(LiveQueryRegistry::new());
        let subscription = registry.register(ContactQuery::All, callback_sink(|_| {}));
        assert_eq!(registry.len(), 1);
        subscription.cancel();
        assert!(registry.is_empty());
    }
}
