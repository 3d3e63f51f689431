//! Contact import/export formats.
//!
//! # Responsibility
//! - Serialize contact snapshots to CSV or vCard 3.0.
//! - Parse CSV/vCard input into unsaved contacts for batch insertion.
//!
//! # Invariants
//! - Imported contacts always carry the unsaved id so the store assigns ids.
//! - Malformed records are skipped, never partially imported.

pub mod csv;
pub mod vcard;

use crate::model::contact::{Contact, ContactId};
use crate::repo::contact_repo::StoreError;
use crate::service::contact_store::ContactStore;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{BufRead, Write};
use std::path::Path;

pub type ContactIoResult<T> = Result<T, ContactIoError>;

#[derive(Debug)]
pub enum ContactIoError {
    Io(std::io::Error),
    Store(StoreError),
    UnsupportedFormat(String),
}

impl Display for ContactIoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "contact file i/o failed: {err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::UnsupportedFormat(value) => {
                write!(f, "unsupported contact file format `{value}`; expected csv|vcf")
            }
        }
    }
}

impl Error for ContactIoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::UnsupportedFormat(_) => None,
        }
    }
}

impl From<std::io::Error> for ContactIoError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<StoreError> for ContactIoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Supported interchange formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactFormat {
    Csv,
    VCard,
}

impl ContactFormat {
    /// Picks a format from a file extension (`csv`, `vcf`, `vcard`).
    pub fn from_path(path: &Path) -> ContactIoResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "vcf" | "vcard" => Ok(Self::VCard),
            _ => Err(ContactIoError::UnsupportedFormat(extension)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::VCard => "vcf",
        }
    }

    pub fn read(self, reader: impl BufRead) -> ContactIoResult<Vec<Contact>> {
        match self {
            Self::Csv => csv::import_csv(reader),
            Self::VCard => vcard::import_vcard(reader),
        }
    }

    pub fn write(self, contacts: &[Contact], writer: impl Write) -> ContactIoResult<()> {
        match self {
            Self::Csv => csv::export_csv(contacts, writer),
            Self::VCard => vcard::export_vcard(contacts, writer),
        }
    }
}

impl ContactStore {
    /// Parses `reader` and inserts every parsed contact in one transaction.
    pub fn import(
        &self,
        format: ContactFormat,
        reader: impl BufRead,
    ) -> ContactIoResult<Vec<ContactId>> {
        let contacts = format.read(reader)?;
        let ids = self.insert_all(&contacts)?;
        info!(
            "event=contact_import module=io status=ok format={} count={}",
            format.label(),
            ids.len()
        );
        Ok(ids)
    }

    /// Writes all contacts, ordered by name, to `writer`.
    pub fn export(&self, format: ContactFormat, writer: impl Write) -> ContactIoResult<usize> {
        let contacts = self.get_all()?;
        format.write(&contacts, writer)?;
        info!(
            "event=contact_export module=io status=ok format={} count={}",
            format.label(),
            contacts.len()
        );
        Ok(contacts.len())
    }
}
