//! CSV interchange: `Name,PhoneNumber,Group,IsFavorite`.
//!
//! Text fields are always quoted on export with `""` escaping; the favorite
//! column is `1` or `0`. Import skips the header line and any row with fewer
//! than two fields.

use super::ContactIoResult;
use crate::model::contact::Contact;
use std::io::{BufRead, BufWriter, Write};

pub const CSV_HEADER: &str = "Name,PhoneNumber,Group,IsFavorite";

pub fn export_csv(contacts: &[Contact], writer: impl Write) -> ContactIoResult<()> {
    let mut writer = BufWriter::new(writer);
    writeln!(writer, "{CSV_HEADER}")?;
    for contact in contacts {
        writeln!(
            writer,
            "{},{},{},{}",
            quote(&contact.name),
            quote(&contact.phone_number),
            quote(&contact.group),
            if contact.is_favorite { "1" } else { "0" }
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn import_csv(reader: impl BufRead) -> ContactIoResult<Vec<Contact>> {
    let mut contacts = Vec::new();
    for line in reader.lines().skip(1) {
        let line = line?;
        let fields = parse_csv_line(line.trim_end_matches('\r'));
        if fields.len() < 2 {
            continue;
        }

        let mut fields = fields.into_iter();
        let name = fields.next().unwrap_or_default();
        let phone_number = fields.next().unwrap_or_default();
        let group = fields.next().unwrap_or_default();
        let is_favorite = fields.next().is_some_and(|value| value.trim() == "1");

        let contact = Contact::new(name, phone_number)
            .with_group(group)
            .with_favorite(is_favorite);
        if contact.validate().is_ok() {
            contacts.push(contact);
        }
    }
    Ok(contacts)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Splits one CSV record honoring double-quoted fields.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                other => current.push(other),
            }
        } else {
            match ch {
                '"' => in_quotes = true,
                ',' => fields.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
    }
    fields.push(current);
    fields
}
