//! Two-letter client codes derived from free-text job codes.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::Date;

/// Code used to name a new log when nothing could be derived from the label.
pub const FALLBACK_CLIENT_CODE: &str = "XX";

/// Infix shared by every log document name.
pub const LOG_DOCUMENT_INFIX: &str = "_SOAP_LOG_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientCode(String);

impl ClientCode {
    fn from_letters(first: char, second: char) -> Self {
        let mut code = String::with_capacity(2);
        code.push(first);
        code.push(second);
        Self(code)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the two-letter client code for a job code such as `"John S. (ABA)"`.
///
/// Text from the first `(` onward is ignored. Multi-word labels use the first
/// letter of the first and last words; single-word labels use their first two
/// letters, padding a lone letter with `X`. Returns `None` when no letters are
/// available to build a code from.
#[must_use]
pub fn derive_client_code(job_code: &str) -> Option<ClientCode> {
    let name_part = job_code
        .find('(')
        .map_or(job_code, |index| &job_code[..index])
        .trim();
    if name_part.is_empty() {
        return None;
    }

    let words: Vec<&str> = name_part.split_whitespace().collect();
    match words.as_slice() {
        [] => None,
        [single] => {
            let letters = ascii_letters_upper(single);
            let mut chars = letters.chars();
            match (chars.next(), chars.next()) {
                (Some(first), Some(second)) => Some(ClientCode::from_letters(first, second)),
                (Some(first), None) => Some(ClientCode::from_letters(first, 'X')),
                _ => None,
            }
        }
        [first, .., last] => {
            let first = ascii_letters_upper(first).chars().next()?;
            let last = ascii_letters_upper(last).chars().next()?;
            Some(ClientCode::from_letters(first, last))
        }
    }
}

/// Search prefix for a client's log documents, e.g. `JS_SOAP_LOG_`.
#[must_use]
pub fn log_document_prefix(code: &ClientCode) -> String {
    format!("{code}{LOG_DOCUMENT_INFIX}")
}

/// Full log document name for a creation date, e.g. `JS_SOAP_LOG_031524`.
#[must_use]
pub fn log_document_name(code: Option<&ClientCode>, created_on: Date) -> String {
    let code = code.map_or(FALLBACK_CLIENT_CODE, ClientCode::as_str);
    format!(
        "{code}{LOG_DOCUMENT_INFIX}{:02}{:02}{:02}",
        u8::from(created_on.month()),
        created_on.day(),
        created_on.year().rem_euclid(100)
    )
}

fn ascii_letters_upper(token: &str) -> String {
    token
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::must_some;
    use proptest::prelude::*;
    use time::macros::date;

    fn code_of(label: &str) -> String {
        must_some(derive_client_code(label)).as_str().to_string()
    }

    #[test]
    fn multi_word_label_uses_first_and_last_initials() {
        assert_eq!(code_of("John S. (ABA)"), "JS");
        assert_eq!(code_of("mary ann o'neil"), "MO");
        assert_eq!(code_of("  Ana   Lopez  "), "AL");
    }

    #[test]
    fn single_word_label_uses_first_two_letters() {
        assert_eq!(code_of("CUSD"), "CU");
        assert_eq!(code_of("CUSD (ABA)"), "CU");
        assert_eq!(code_of("r2d2"), "RD");
    }

    #[test]
    fn single_letter_label_is_padded_with_x() {
        assert_eq!(code_of("A"), "AX");
        assert_eq!(code_of("b."), "BX");
    }

    #[test]
    fn labels_without_letters_do_not_derive() {
        assert!(derive_client_code("").is_none());
        assert!(derive_client_code("   ").is_none());
        assert!(derive_client_code("(ABA)").is_none());
        assert!(derive_client_code("1234").is_none());
        assert!(derive_client_code("John 42").is_none());
    }

    #[test]
    fn document_names_follow_mmddyy_convention() {
        let code = must_some(derive_client_code("John S. (ABA)"));
        assert_eq!(log_document_prefix(&code), "JS_SOAP_LOG_");
        assert_eq!(
            log_document_name(Some(&code), date!(2024 - 03 - 05)),
            "JS_SOAP_LOG_030524"
        );
        assert_eq!(
            log_document_name(None, date!(2031 - 12 - 31)),
            "XX_SOAP_LOG_123131"
        );
    }

    proptest! {
        #[test]
        fn prop_multi_word_code_is_initials(
            first in "[A-Za-z][a-z]{0,8}",
            middle in prop::collection::vec("[A-Za-z.]{1,6}", 0..3),
            last in "[A-Za-z][a-z]{0,8}",
            suffix in "[ A-Za-z]{0,6}",
        ) {
            let mut label = first.clone();
            for word in &middle {
                label.push(' ');
                label.push_str(word);
            }
            label.push(' ');
            label.push_str(&last);
            label.push_str(" (");
            label.push_str(&suffix);
            label.push(')');

            let expected: String = [first.chars().next(), last.chars().next()]
                .into_iter()
                .flatten()
                .map(|ch| ch.to_ascii_uppercase())
                .collect();
            prop_assert_eq!(code_of(&label), expected);
        }

        #[test]
        fn prop_single_word_code_is_first_two_letters(word in "[A-Za-z]{2,12}") {
            prop_assert_eq!(code_of(&word), word[..2].to_ascii_uppercase());
        }

        #[test]
        fn prop_derivation_is_stable(label in "\\PC{0,24}") {
            prop_assert_eq!(derive_client_code(&label), derive_client_code(&label));
        }
    }
}
