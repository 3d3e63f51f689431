//! Domain model for the contact store.
//!
//! # Responsibility
//! - Define the canonical contact record shared by store, views and importers.
//!
//! # Invariants
//! - Every persisted contact is identified by a stable, non-zero `ContactId`.
//! - Callers only ever hold owned snapshots, never live rows.

pub mod contact;
