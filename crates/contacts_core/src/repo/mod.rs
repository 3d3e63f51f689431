//! Repository layer over the `contacts` table.
//!
//! # Responsibility
//! - Define the data access contract used by the store.
//! - Isolate SQLite statements and row mapping from orchestration.
//!
//! # Invariants
//! - Writes enforce `Contact::validate()` before persistence.
//! - Strict update reports `NotFound`; deletes of missing rows succeed.

pub mod contact_repo;
