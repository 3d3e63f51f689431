//! Thread-safe contact store façade.
//!
//! # Responsibility
//! - Own the writer connection, the reader pool and the live-view registry.
//! - Serialize mutations and publish table changes to live views after
//!   commit.
//!
//! # Invariants
//! - Mutations hold the writer lock for exactly one repository transaction;
//!   the lock is released before live views are refreshed.
//! - File-backed stores read through WAL reader connections and observe only
//!   committed rows. In-memory stores read through the writer connection and
//!   wait behind an in-flight write.
//! - Live views refresh only when a mutation changed at least one row.

use crate::config::StoreConfig;
use crate::db::{open_db_in_memory, open_db_read_only, open_db_with_timeout, DbResult};
use crate::live::{callback_sink, channel_sink, LiveQueryRegistry, Subscription};
use crate::model::contact::{Contact, ContactId};
use crate::repo::contact_repo::{
    ContactQuery, ContactRepository, SqliteContactRepository, StoreResult,
};
use log::{info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Transactional contact store with live views.
pub struct ContactStore {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    live: Arc<LiveQueryRegistry>,
}

impl ContactStore {
    /// Opens a store as described by `config`.
    ///
    /// # Errors
    /// - `StorageFault` when the database cannot be opened or migrated.
    /// - Readiness errors when the schema does not carry the contacts shape.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let Some(path) = config.db_path.as_deref() else {
            return Self::from_connections(open_db_in_memory()?, Vec::new());
        };

        let writer = open_db_with_timeout(path, config.busy_timeout)?;
        let readers = (0..config.effective_reader_connections())
            .map(|_| open_db_read_only(path, config.busy_timeout))
            .collect::<DbResult<Vec<_>>>()?;
        Self::from_connections(writer, readers)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&StoreConfig::default())
    }

    pub fn open_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(&StoreConfig::with_path(path.as_ref()))
    }

    fn from_connections(writer: Connection, readers: Vec<Connection>) -> StoreResult<Self> {
        SqliteContactRepository::try_new(&writer)?;
        for reader in &readers {
            SqliteContactRepository::try_new(reader)?;
        }

        info!(
            "event=store_open module=store status=ok readers={}",
            readers.len()
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers: readers.into_iter().map(Mutex::new).collect(),
            next_reader: AtomicUsize::new(0),
            live: Arc::new(LiveQueryRegistry::new()),
        })
    }

    /// Inserts one contact and returns its id; id `0` is auto-assigned.
    ///
    /// Fails with `ConstraintViolation` when a non-zero id already exists.
    pub fn insert(&self, contact: &Contact) -> StoreResult<ContactId> {
        self.write("contact_insert", |repo| {
            repo.insert(contact).map(|id| (id, true))
        })
    }

    /// Inserts all contacts atomically; nothing is stored if any row fails.
    pub fn insert_all(&self, contacts: &[Contact]) -> StoreResult<Vec<ContactId>> {
        self.write("contact_insert_all", |repo| {
            repo.insert_all(contacts).map(|ids| {
                let changed = !ids.is_empty();
                (ids, changed)
            })
        })
    }

    /// Insert-or-replace keyed by id.
    pub fn upsert(&self, contact: &Contact) -> StoreResult<ContactId> {
        self.write("contact_upsert", |repo| {
            repo.upsert(contact).map(|id| (id, true))
        })
    }

    /// Insert-or-replace for a batch, atomically.
    pub fn upsert_all(&self, contacts: &[Contact]) -> StoreResult<Vec<ContactId>> {
        self.write("contact_upsert_all", |repo| {
            repo.upsert_all(contacts).map(|ids| {
                let changed = !ids.is_empty();
                (ids, changed)
            })
        })
    }

    /// Strict update; `NotFound` when no row carries `contact.id`.
    pub fn update(&self, contact: &Contact) -> StoreResult<()> {
        self.write("contact_update", |repo| {
            repo.update(contact).map(|()| ((), true))
        })
    }

    /// Deletes the row with `contact.id`; missing rows are not an error.
    pub fn delete(&self, contact: &Contact) -> StoreResult<()> {
        self.delete_by_id(contact.id)
    }

    pub fn delete_by_id(&self, id: ContactId) -> StoreResult<()> {
        self.write("contact_delete", |repo| {
            repo.delete_by_id(id).map(|removed| ((), removed))
        })
    }

    /// Sets the favorite flag to `is_favorite`.
    ///
    /// This is an assignment, not a flip: callers toggling a contact pass
    /// `!contact.is_favorite`.
    pub fn toggle_favorite(&self, id: ContactId, is_favorite: bool) -> StoreResult<()> {
        self.write("contact_set_favorite", |repo| {
            repo.set_favorite(id, is_favorite).map(|changed| ((), changed))
        })
    }

    /// Records `timestamp` (epoch milliseconds) as the last call time.
    pub fn mark_called(&self, id: ContactId, timestamp: i64) -> StoreResult<()> {
        self.write("contact_mark_called", |repo| {
            repo.mark_called(id, timestamp).map(|changed| ((), changed))
        })
    }

    /// Records the current wall clock as the last call time and returns it.
    pub fn mark_called_now(&self, id: ContactId) -> StoreResult<i64> {
        let now = now_epoch_ms();
        self.mark_called(id, now)?;
        Ok(now)
    }

    /// Point lookup. Not a live view.
    pub fn get_by_id(&self, id: ContactId) -> StoreResult<Option<Contact>> {
        self.read(|repo| repo.get_by_id(id))
    }

    pub fn get_all(&self) -> StoreResult<Vec<Contact>> {
        self.list(&ContactQuery::All)
    }

    pub fn search(&self, query: &str) -> StoreResult<Vec<Contact>> {
        self.list(&ContactQuery::Search(query.to_string()))
    }

    pub fn search_by_phone(&self, digits: &str) -> StoreResult<Vec<Contact>> {
        self.list(&ContactQuery::SearchByPhone(digits.to_string()))
    }

    pub fn get_favorites(&self) -> StoreResult<Vec<Contact>> {
        self.list(&ContactQuery::Favorites)
    }

    pub fn get_by_group(&self, group: &str) -> StoreResult<Vec<Contact>> {
        self.list(&ContactQuery::ByGroup(group.to_string()))
    }

    pub fn get_recently_contacted(&self, limit: u32) -> StoreResult<Vec<Contact>> {
        self.list(&ContactQuery::RecentlyContacted(limit))
    }

    /// Contacts-screen listing: text search (blank lists all) plus an
    /// optional group filter (`None` or `"All"` disables it).
    pub fn browse(&self, text: &str, group: Option<&str>) -> StoreResult<Vec<Contact>> {
        self.list(&ContactQuery::Browse {
            text: text.to_string(),
            group: group.map(str::to_string),
        })
    }

    pub fn dialer_suggestions(&self, digits: &str) -> StoreResult<Vec<Contact>> {
        self.list(&ContactQuery::Dialer(digits.to_string()))
    }

    /// Runs any read template once.
    pub fn list(&self, query: &ContactQuery) -> StoreResult<Vec<Contact>> {
        self.read(|repo| repo.list(query))
    }

    pub fn count(&self) -> StoreResult<u64> {
        self.read(|repo| repo.count())
    }

    /// Subscribes `callback` to a live view.
    ///
    /// The callback gets the current result right away, then the refreshed
    /// result after every committed change to the table, until the returned
    /// [`Subscription`] is cancelled or dropped.
    pub fn subscribe(
        &self,
        query: ContactQuery,
        callback: impl Fn(&[Contact]) + Send + Sync + 'static,
    ) -> Subscription {
        let subscription = self.live.register(query, callback_sink(callback));
        self.flush_live();
        subscription
    }

    /// Channel flavour of [`Self::subscribe`]. Dropping the receiver ends the
    /// subscription on the next delivery.
    pub fn subscribe_channel(&self, query: ContactQuery) -> (Subscription, Receiver<Vec<Contact>>) {
        let (sender, receiver) = mpsc::channel();
        let subscription = self.live.register(query, channel_sink(sender));
        self.flush_live();
        (subscription, receiver)
    }

    /// Number of live subscriptions currently registered.
    pub fn subscription_count(&self) -> usize {
        self.live.len()
    }

    fn write<T>(
        &self,
        event: &'static str,
        f: impl FnOnce(&SqliteContactRepository<'_>) -> StoreResult<(T, bool)>,
    ) -> StoreResult<T> {
        let started_at = Instant::now();
        let outcome = {
            let conn = lock_connection(&self.writer);
            f(&SqliteContactRepository::assume_ready(&conn))
        };

        match outcome {
            Ok((value, changed)) => {
                info!(
                    "event={event} module=store status=ok changed={changed} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                if changed {
                    self.live.mark_table_changed();
                    self.flush_live();
                }
                Ok(value)
            }
            Err(err) => {
                warn!(
                    "event={event} module=store status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&SqliteContactRepository<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        if self.readers.is_empty() {
            let conn = lock_connection(&self.writer);
            return f(&SqliteContactRepository::assume_ready(&conn));
        }

        let len = self.readers.len();
        let start = self.next_reader.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            let guard = match self.readers[(start + offset) % len].try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => continue,
            };
            return f(&SqliteContactRepository::assume_ready(&guard));
        }

        let conn = lock_connection(&self.readers[start]);
        f(&SqliteContactRepository::assume_ready(&conn))
    }

    fn flush_live(&self) {
        self.live.flush(|query| self.list(query));
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_epoch_ms() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{now_epoch_ms, ContactStore};
    use crate::model::contact::Contact;

    #[test]
    fn in_memory_store_has_no_reader_pool() {
        let store = ContactStore::open_in_memory().unwrap();
        assert!(store.readers.is_empty());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn mark_called_now_stores_current_time() {
        let store = ContactStore::open_in_memory().unwrap();
        let id = store.insert(&Contact::new("Ada", "555")).unwrap();

        let before = now_epoch_ms();
        let stamped = store.mark_called_now(id).unwrap();
        assert!(stamped >= before);

        let loaded = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.last_called_at, Some(stamped));
    }
}
