//! Store-level services.
//!
//! # Responsibility
//! - Combine repository calls, connection ownership and live-view
//!   publication into the API hosts call.

pub mod contact_store;
