//! Core contact store.
//! Owns the `contacts` table, its transactional CRUD surface and the live
//! views that re-deliver ordered results after each committed change.

pub mod config;
pub mod db;
pub mod dialer;
pub mod io;
pub mod live;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::StoreConfig;
pub use io::{ContactFormat, ContactIoError, ContactIoResult};
pub use live::{LiveQueryRegistry, Subscription};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::contact::{Contact, ContactId, ContactValidationError, UNSAVED_CONTACT_ID};
pub use repo::contact_repo::{
    ContactQuery, ContactRepository, SqliteContactRepository, StoreError, StoreResult, ALL_GROUPS,
};
pub use service::contact_store::ContactStore;

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
