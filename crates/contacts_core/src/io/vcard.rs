//! vCard 3.0 interchange.
//!
//! Export writes one card per contact with `FN`, `TEL;TYPE=CELL` and, for
//! grouped contacts, `CATEGORIES`. Import reads the same properties (any
//! `TEL` parameters are accepted) and keeps cards that have both a name and
//! a phone number.

use super::ContactIoResult;
use crate::model::contact::Contact;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{BufRead, BufWriter, Write};

static PROPERTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z][A-Za-z0-9-]*)(?P<params>;[^:]*)?:(?P<value>.*)$")
        .expect("valid vcard property regex")
});

pub fn export_vcard(contacts: &[Contact], writer: impl Write) -> ContactIoResult<()> {
    let mut writer = BufWriter::new(writer);
    for contact in contacts {
        writeln!(writer, "BEGIN:VCARD")?;
        writeln!(writer, "VERSION:3.0")?;
        writeln!(writer, "FN:{}", contact.name)?;
        writeln!(writer, "TEL;TYPE=CELL:{}", contact.phone_number)?;
        if !contact.group.is_empty() {
            writeln!(writer, "CATEGORIES:{}", contact.group)?;
        }
        writeln!(writer, "END:VCARD")?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Default)]
struct PendingCard {
    name: String,
    phone_number: String,
    group: String,
}

pub fn import_vcard(reader: impl BufRead) -> ContactIoResult<Vec<Contact>> {
    let mut contacts = Vec::new();
    let mut card = PendingCard::default();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("END:VCARD") {
            let finished = std::mem::take(&mut card);
            if !finished.name.trim().is_empty() && !finished.phone_number.trim().is_empty() {
                contacts.push(
                    Contact::new(finished.name, finished.phone_number).with_group(finished.group),
                );
            }
            continue;
        }

        let Some(captures) = PROPERTY_RE.captures(trimmed) else {
            continue;
        };
        let value = captures["value"].trim().to_string();
        match captures["name"].to_ascii_uppercase().as_str() {
            "FN" => card.name = value,
            "TEL" => card.phone_number = value,
            "CATEGORIES" => card.group = value,
            _ => {}
        }
    }

    Ok(contacts)
}

#[cfg(test)]
mod tests {
    use super::{export_vcard, import_vcard};
    use crate::model::contact::Contact;

    #[test]
    fn export_writes_categories_only_for_grouped_contacts() {
        let contacts = vec![
            Contact::new("Ada", "555").with_group("Family"),
            Contact::new("Bob", "777"),
        ];
        let mut buffer = Vec::new();
        export_vcard(&contacts, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(text.matches("BEGIN:VCARD").count(), 2);
        assert_eq!(text.matches("CATEGORIES:").count(), 1);
        assert!(text.contains("TEL;TYPE=CELL:777\n"));
    }

    #[test]
    fn import_accepts_tel_parameters_and_skips_incomplete_cards() {
        let input = "BEGIN:VCARD\nVERSION:3.0\nFN:Ada Lovelace\nTEL;TYPE=HOME;VALUE=uri:+44 20\nCATEGORIES:Work\nEND:VCARD\n\
                     BEGIN:VCARD\nFN:No Phone\nEND:VCARD\n\
                     BEGIN:VCARD\nTEL:123\nEND:VCARD\n";
        let imported = import_vcard(input.as_bytes()).unwrap();

        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].name, "Ada Lovelace");
        assert_eq!(imported[0].phone_number, "+44 20");
        assert_eq!(imported[0].group, "Work");
        assert!(imported[0].is_unsaved());
    }
}
