//! Contact domain model.
//!
//! # Responsibility
//! - Define the single persisted record of the store.
//! - Validate required fields before persistence.
//!
//! # Invariants
//! - `id == UNSAVED_CONTACT_ID` means "not yet stored"; the store assigns a
//!   fresh id on insert.
//! - Once assigned, `id` never changes for the lifetime of the row.
//! - `name` and `phone_number` are never blank in persisted rows.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Primary key of a contact row.
pub type ContactId = i64;

/// Sentinel id requesting auto-assignment on insert.
pub const UNSAVED_CONTACT_ID: ContactId = 0;

/// Persisted contact record.
///
/// Serialized with camelCase names to match the `contacts` column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Row id; `0` until stored.
    #[serde(default)]
    pub id: ContactId,
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub is_favorite: bool,
    /// Free-form group label; empty string means "no group".
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub photo_uri: Option<String>,
    /// Unix epoch milliseconds of the last outgoing call.
    #[serde(default)]
    pub last_called_at: Option<i64>,
}

/// Validation failures for contact writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    BlankName,
    BlankPhoneNumber,
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "contact name must not be blank"),
            Self::BlankPhoneNumber => write!(f, "contact phone number must not be blank"),
        }
    }
}

impl Error for ContactValidationError {}

impl Contact {
    /// Creates an unsaved contact with default optional fields.
    pub fn new(name: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            id: UNSAVED_CONTACT_ID,
            name: name.into(),
            phone_number: phone_number.into(),
            is_favorite: false,
            group: String::new(),
            photo_uri: None,
            last_called_at: None,
        }
    }

    /// Builder-style group assignment.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Builder-style favorite flag.
    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    /// Returns whether the store still has to assign an id.
    pub fn is_unsaved(&self) -> bool {
        self.id == UNSAVED_CONTACT_ID
    }

    /// Checks required fields.
    ///
    /// # Errors
    /// - `BlankName` when `name` is empty or whitespace only.
    /// - `BlankPhoneNumber` when `phone_number` is empty or whitespace only.
    pub fn validate(&self) -> Result<(), ContactValidationError> {
        if self.name.trim().is_empty() {
            return Err(ContactValidationError::BlankName);
        }
        if self.phone_number.trim().is_empty() {
            return Err(ContactValidationError::BlankPhoneNumber);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Contact, ContactValidationError};

    #[test]
    fn new_contact_is_unsaved_with_defaults() {
        let contact = Contact::new("Ada", "555-0100");
        assert!(contact.is_unsaved());
        assert!(!contact.is_favorite);
        assert!(contact.group.is_empty());
        assert_eq!(contact.photo_uri, None);
        assert_eq!(contact.last_called_at, None);
    }

    #[test]
    fn validate_rejects_blank_required_fields() {
        assert_eq!(
            Contact::new("  ", "1").validate(),
            Err(ContactValidationError::BlankName)
        );
        assert_eq!(
            Contact::new("Ada", "").validate(),
            Err(ContactValidationError::BlankPhoneNumber)
        );
        assert!(Contact::new("Ada", "1").validate().is_ok());
    }
}
