//! Dial-pad suggestion matching.
//!
//! A contact matches typed digits when its phone number contains them, or
//! when its name spelled on a phone keypad (T9) contains them.

use crate::model::contact::Contact;

/// Fewer typed digits than this yields no suggestions.
pub const MIN_DIALER_DIGITS: usize = 2;

fn keypad_digit(ch: char) -> Option<char> {
    match ch {
        'a'..='c' => Some('2'),
        'd'..='f' => Some('3'),
        'g'..='i' => Some('4'),
        'j'..='l' => Some('5'),
        'm'..='o' => Some('6'),
        'p'..='s' => Some('7'),
        't'..='v' => Some('8'),
        'w'..='z' => Some('9'),
        _ => None,
    }
}

/// Encodes a name as keypad digits, dropping characters without a key.
pub fn name_to_t9(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter_map(keypad_digit)
        .collect()
}

pub fn matches_digits(contact: &Contact, digits: &str) -> bool {
    contact.phone_number.contains(digits) || name_to_t9(&contact.name).contains(digits)
}

/// Keeps contacts matching `digits`, preserving input order.
pub fn filter_suggestions(contacts: Vec<Contact>, digits: &str) -> Vec<Contact> {
    if digits.chars().count() < MIN_DIALER_DIGITS {
        return Vec::new();
    }
    contacts
        .into_iter()
        .filter(|contact| matches_digits(contact, digits))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{filter_suggestions, name_to_t9};
    use crate::model::contact::Contact;

    #[test]
    fn t9_encoding_ignores_case_and_non_letters() {
        assert_eq!(name_to_t9("John"), "5646");
        assert_eq!(name_to_t9("Mary-Jo 2"), "627956");
        assert_eq!(name_to_t9("Émile"), "6453");
    }

    #[test]
    fn suggestions_match_phone_or_keypad_name() {
        let contacts = vec![
            Contact::new("John", "555-0100"),
            Contact::new("Alice", "0123"),
            Contact::new("Bob", "999"),
        ];
        let by_name = filter_suggestions(contacts.clone(), "564");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "John");

        let by_phone = filter_suggestions(contacts.clone(), "12");
        assert_eq!(by_phone.len(), 1);
        assert_eq!(by_phone[0].name, "Alice");

        assert!(filter_suggestions(contacts, "5").is_empty());
    }
}
