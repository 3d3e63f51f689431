//! Store configuration.
//!
//! # Responsibility
//! - Describe where the store persists data and how connections are sized.
//! - Resolve overrides from process environment.
//!
//! # Invariants
//! - `db_path = None` selects an in-memory store.
//! - At least one reader connection is opened for file-backed stores.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the database file path.
pub const DB_PATH_ENV: &str = "CONTACTS_DB_PATH";
/// Environment variable overriding the reader pool size.
pub const READERS_ENV: &str = "CONTACTS_READERS";

const DEFAULT_READER_CONNECTIONS: usize = 2;
const MAX_READER_CONNECTIONS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite file; `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    /// Read-only connections serving reads and live-view refreshes.
    pub reader_connections: usize,
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            reader_connections: DEFAULT_READER_CONNECTIONS,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// File-backed config with defaults for everything else.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Applies `CONTACTS_DB_PATH` and `CONTACTS_READERS` on top of defaults.
    ///
    /// Blank or unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(DB_PATH_ENV) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                config.db_path = Some(PathBuf::from(trimmed));
            }
        }
        if let Some(readers) = std::env::var(READERS_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
        {
            config.reader_connections = readers;
        }
        config
    }

    /// Reader pool size clamped to `1..=16`.
    pub fn effective_reader_connections(&self) -> usize {
        self.reader_connections.clamp(1, MAX_READER_CONNECTIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;

    #[test]
    fn default_config_is_in_memory() {
        let config = StoreConfig::default();
        assert!(config.db_path.is_none());
        assert_eq!(config.effective_reader_connections(), 2);
    }

    #[test]
    fn reader_pool_is_clamped() {
        let mut config = StoreConfig::with_path("/tmp/contacts.sqlite3");
        config.reader_connections = 0;
        assert_eq!(config.effective_reader_connections(), 1);
        config.reader_connections = 99;
        assert_eq!(config.effective_reader_connections(), 16);
    }
}
