//! Contact repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and filtered-view APIs over the `contacts` table.
//! - Keep SQL text, parameter binding and row mapping inside this module.
//!
//! # Invariants
//! - Every mutation runs inside its own `BEGIN IMMEDIATE` transaction and
//!   either commits fully or leaves the table untouched.
//! - Write paths call `Contact::validate()` before touching SQL.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Substring filters match the caller's text literally (`%`, `_` and `\`
//!   are escaped).

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::dialer;
use crate::model::contact::{Contact, ContactId, ContactValidationError, UNSAVED_CONTACT_ID};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    name,
    phoneNumber,
    isFavorite,
    \"group\",
    photoUri,
    lastCalledAt
FROM contacts";

const INSERT_SQL: &str = "INSERT INTO contacts (
    id,
    name,
    phoneNumber,
    isFavorite,
    \"group\",
    photoUri,
    lastCalledAt
) VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6, ?7);";

const UPSERT_SQL: &str = "INSERT OR REPLACE INTO contacts (
    id,
    name,
    phoneNumber,
    isFavorite,
    \"group\",
    photoUri,
    lastCalledAt
) VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6, ?7);";

const REQUIRED_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "phoneNumber",
    "isFavorite",
    "group",
    "photoUri",
    "lastCalledAt",
];

/// Group label that disables group filtering in browse views.
pub const ALL_GROUPS: &str = "All";

pub type StoreResult<T> = Result<T, StoreError>;

/// Error taxonomy for contact persistence and queries.
#[derive(Debug)]
pub enum StoreError {
    /// Duplicate primary key or other schema constraint breach.
    ConstraintViolation(String),
    /// Strict update targeted a row that does not exist.
    NotFound(ContactId),
    /// Engine-level failure (I/O, corruption, locking).
    StorageFault(DbError),
    Validation(ContactValidationError),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::StorageFault(err) => write!(f, "storage fault: {err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match required {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl StoreError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::NotFound(_) => "not_found",
            Self::StorageFault(_) => "storage_fault",
            Self::Validation(_) => "validation_failed",
            Self::InvalidData(_) => "invalid_data",
            Self::UninitializedConnection { .. } => "uninitialized_connection",
            Self::MissingRequiredTable(_) => "missing_table",
            Self::MissingRequiredColumn { .. } => "missing_column",
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageFault(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContactValidationError> for StoreError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::StorageFault(other),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &value {
            if failure.code == ErrorCode::ConstraintViolation {
                return Self::ConstraintViolation(
                    message.clone().unwrap_or_else(|| failure.to_string()),
                );
            }
        }
        Self::StorageFault(DbError::Sqlite(value))
    }
}

/// Read templates served by the repository and by live views.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContactQuery {
    /// Full scan ordered by name.
    All,
    /// Name or phone number contains the text.
    Search(String),
    /// Phone number contains the digits.
    SearchByPhone(String),
    Favorites,
    /// Exact group match.
    ByGroup(String),
    /// Rows with `lastCalledAt`, newest first, truncated to the limit.
    RecentlyContacted(u32),
    /// Contacts screen listing: blank text lists everything, `None` or
    /// [`ALL_GROUPS`] disables the group filter.
    Browse {
        text: String,
        group: Option<String>,
    },
    /// Dial-pad suggestions by phone substring or T9 name encoding.
    Dialer(String),
}

/// Repository interface for contact persistence.
pub trait ContactRepository {
    /// Inserts one contact; id `0` requests auto-assignment.
    fn insert(&self, contact: &Contact) -> StoreResult<ContactId>;
    /// Inserts all contacts in one transaction; any failure aborts the batch.
    fn insert_all(&self, contacts: &[Contact]) -> StoreResult<Vec<ContactId>>;
    /// Insert-or-replace keyed by id.
    fn upsert(&self, contact: &Contact) -> StoreResult<ContactId>;
    /// Insert-or-replace for a batch in one transaction.
    fn upsert_all(&self, contacts: &[Contact]) -> StoreResult<Vec<ContactId>>;
    /// Replaces all columns of an existing row; `NotFound` when absent.
    fn update(&self, contact: &Contact) -> StoreResult<()>;
    /// Deletes by id. Returns whether a row was removed.
    fn delete_by_id(&self, id: ContactId) -> StoreResult<bool>;
    /// Sets the favorite flag. Returns whether a row was changed.
    fn set_favorite(&self, id: ContactId, is_favorite: bool) -> StoreResult<bool>;
    /// Sets `lastCalledAt`. Returns whether a row was changed.
    fn mark_called(&self, id: ContactId, timestamp: i64) -> StoreResult<bool>;
    fn get_by_id(&self, id: ContactId) -> StoreResult<Option<Contact>>;
    fn list(&self, query: &ContactQuery) -> StoreResult<Vec<Contact>>;
    fn count(&self) -> StoreResult<u64>;
}

/// SQLite-backed contact repository.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    /// Constructs a repository after checking schema readiness.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema
    ///   does not carry the `contacts` shape.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Wraps a connection already verified by [`Self::try_new`].
    pub(crate) fn assume_ready(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn write_tx(&self) -> StoreResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn insert_batch(&self, sql: &str, contacts: &[Contact]) -> StoreResult<Vec<ContactId>> {
        for contact in contacts {
            contact.validate()?;
        }

        let tx = self.write_tx()?;
        let mut ids = Vec::with_capacity(contacts.len());
        {
            let mut stmt = tx.prepare_cached(sql)?;
            for contact in contacts {
                stmt.execute(params![
                    contact.id,
                    contact.name.as_str(),
                    contact.phone_number.as_str(),
                    contact.is_favorite,
                    contact.group.as_str(),
                    contact.photo_uri.as_deref(),
                    contact.last_called_at,
                ])?;
                let id = if contact.id == UNSAVED_CONTACT_ID {
                    tx.last_insert_rowid()
                } else {
                    contact.id
                };
                ids.push(id);
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    fn execute_in_tx(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<usize> {
        let tx = self.write_tx()?;
        let changed = tx.execute(sql, params)?;
        tx.commit()?;
        Ok(changed)
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn insert(&self, contact: &Contact) -> StoreResult<ContactId> {
        let ids = self.insert_batch(INSERT_SQL, std::slice::from_ref(contact))?;
        first_id(ids)
    }

    fn insert_all(&self, contacts: &[Contact]) -> StoreResult<Vec<ContactId>> {
        self.insert_batch(INSERT_SQL, contacts)
    }

    fn upsert(&self, contact: &Contact) -> StoreResult<ContactId> {
        let ids = self.insert_batch(UPSERT_SQL, std::slice::from_ref(contact))?;
        first_id(ids)
    }

    fn upsert_all(&self, contacts: &[Contact]) -> StoreResult<Vec<ContactId>> {
        self.insert_batch(UPSERT_SQL, contacts)
    }

    fn update(&self, contact: &Contact) -> StoreResult<()> {
        contact.validate()?;

        let tx = self.write_tx()?;
        let changed = tx.execute(
            "UPDATE OR ABORT contacts
             SET
                name = ?2,
                phoneNumber = ?3,
                isFavorite = ?4,
                \"group\" = ?5,
                photoUri = ?6,
                lastCalledAt = ?7
             WHERE id = ?1;",
            params![
                contact.id,
                contact.name.as_str(),
                contact.phone_number.as_str(),
                contact.is_favorite,
                contact.group.as_str(),
                contact.photo_uri.as_deref(),
                contact.last_called_at,
            ],
        )?;

        if changed == 0 {
            // Dropping `tx` rolls back.
            return Err(StoreError::NotFound(contact.id));
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_by_id(&self, id: ContactId) -> StoreResult<bool> {
        let changed = self.execute_in_tx("DELETE FROM contacts WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    fn set_favorite(&self, id: ContactId, is_favorite: bool) -> StoreResult<bool> {
        let changed = self.execute_in_tx(
            "UPDATE contacts SET isFavorite = ?2 WHERE id = ?1;",
            params![id, is_favorite],
        )?;
        Ok(changed > 0)
    }

    fn mark_called(&self, id: ContactId, timestamp: i64) -> StoreResult<bool> {
        let changed = self.execute_in_tx(
            "UPDATE contacts SET lastCalledAt = ?2 WHERE id = ?1;",
            params![id, timestamp],
        )?;
        Ok(changed > 0)
    }

    fn get_by_id(&self, id: ContactId) -> StoreResult<Option<Contact>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{CONTACT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }
        Ok(None)
    }

    fn list(&self, query: &ContactQuery) -> StoreResult<Vec<Contact>> {
        if let ContactQuery::Dialer(digits) = query {
            if digits.chars().count() < dialer::MIN_DIALER_DIGITS {
                return Ok(Vec::new());
            }
            let all = self.list(&ContactQuery::All)?;
            return Ok(dialer::filter_suggestions(all, digits));
        }

        let (sql, bind_values) = build_list_sql(query);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }
        Ok(contacts)
    }

    fn count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contacts;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| StoreError::InvalidData(format!("negative row count `{count}`")))
    }
}

fn first_id(ids: Vec<ContactId>) -> StoreResult<ContactId> {
    ids.into_iter()
        .next()
        .ok_or_else(|| StoreError::InvalidData("insert returned no row id".to_string()))
}

fn build_list_sql(query: &ContactQuery) -> (String, Vec<Value>) {
    let mut sql = format!("{CONTACT_SELECT_SQL} WHERE 1 = 1");
    let mut bind_values: Vec<Value> = Vec::new();
    let mut order = " ORDER BY name ASC, id ASC";

    match query {
        ContactQuery::All | ContactQuery::Dialer(_) => {}
        ContactQuery::Search(text) => {
            push_text_filter(&mut sql, &mut bind_values, text);
        }
        ContactQuery::SearchByPhone(digits) => {
            sql.push_str(" AND phoneNumber LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(like_contains_pattern(digits)));
        }
        ContactQuery::Favorites => {
            sql.push_str(" AND isFavorite = 1");
        }
        ContactQuery::ByGroup(group) => {
            sql.push_str(" AND \"group\" = ?");
            bind_values.push(Value::Text(group.clone()));
        }
        ContactQuery::RecentlyContacted(_) => {
            sql.push_str(" AND lastCalledAt IS NOT NULL");
            order = " ORDER BY lastCalledAt DESC, id ASC";
        }
        ContactQuery::Browse { text, group } => {
            if !text.trim().is_empty() {
                push_text_filter(&mut sql, &mut bind_values, text);
            }
            if let Some(group) = group.as_deref().filter(|group| *group != ALL_GROUPS) {
                sql.push_str(" AND \"group\" = ?");
                bind_values.push(Value::Text(group.to_string()));
            }
        }
    }

    sql.push_str(order);
    if let ContactQuery::RecentlyContacted(limit) = query {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(*limit)));
    }
    sql.push(';');
    (sql, bind_values)
}

fn push_text_filter(sql: &mut String, bind_values: &mut Vec<Value>, text: &str) {
    sql.push_str(" AND (name LIKE ? ESCAPE '\\' OR phoneNumber LIKE ? ESCAPE '\\')");
    let pattern = like_contains_pattern(text);
    bind_values.push(Value::Text(pattern.clone()));
    bind_values.push(Value::Text(pattern));
}

/// Builds a `LIKE` pattern matching `text` as a literal substring.
fn like_contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn parse_contact_row(row: &Row<'_>) -> StoreResult<Contact> {
    let id: ContactId = row.get("id")?;
    let is_favorite = match row.get::<_, i64>("isFavorite")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid isFavorite value `{other}` for contact {id}"
            )));
        }
    };

    let contact = Contact {
        id,
        name: row.get("name")?,
        phone_number: row.get("phoneNumber")?,
        is_favorite,
        group: row.get("group")?,
        photo_uri: row.get("photoUri")?,
        last_called_at: row.get("lastCalledAt")?,
    };
    contact
        .validate()
        .map_err(|err| StoreError::InvalidData(format!("contact {id}: {err}")))?;
    Ok(contact)
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "contacts")? {
        return Err(StoreError::MissingRequiredTable("contacts"));
    }

    for column in REQUIRED_COLUMNS {
        if !table_has_column(conn, "contacts", column)? {
            return Err(StoreError::MissingRequiredColumn {
                table: "contacts",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::{build_list_sql, like_contains_pattern, ContactQuery};

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_contains_pattern("smith"), "%smith%");
        assert_eq!(like_contains_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn recently_contacted_sql_orders_by_recency_and_limits() {
        let (sql, binds) = build_list_sql(&ContactQuery::RecentlyContacted(3));
        assert!(sql.contains("lastCalledAt IS NOT NULL"));
        assert!(sql.contains("ORDER BY lastCalledAt DESC"));
        assert!(sql.ends_with("LIMIT ?;"));
        assert_eq!(binds.len(), 1);
    }

    #[test]
    fn browse_with_all_group_and_blank_text_has_no_filters() {
        let (sql, binds) = build_list_sql(&ContactQuery::Browse {
            text: "   ".to_string(),
            group: Some("All".to_string()),
        });
        assert!(!sql.contains("LIKE"));
        assert!(!sql.contains("\"group\" = ?"));
        assert!(binds.is_empty());
    }
}
