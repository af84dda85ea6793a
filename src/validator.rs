//! Field validation for submitted forms.
//!
//! A [`Validator`] accumulates error messages keyed by form field. The first
//! message recorded for a field wins; later failures for the same field are
//! ignored so the user sees one actionable message at a time.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Sanity check for the shape of an email address.
pub const EMAIL_RX: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

#[derive(Debug, Default, Clone, Serialize)]
pub struct Validator {
    pub field_errors: BTreeMap<String, String>,
    pub non_field_errors: Vec<String>,
}

impl Validator {
    /// True when no field or non-field error has been recorded.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    pub fn add_field_error(&mut self, key: &str, message: &str) {
        self.field_errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn add_non_field_error(&mut self, message: &str) {
        self.non_field_errors.push(message.to_string());
    }

    /// Record `message` under `key` when `ok` is false.
    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_field_error(key, message);
        }
    }
}

#[must_use]
pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// At least `n` characters (not bytes).
#[must_use]
pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

/// No more than `n` characters (not bytes).
#[must_use]
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

#[must_use]
pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

/// Match `value` against `pattern`; an invalid pattern never matches.
#[must_use]
pub fn matches(value: &str, pattern: &str) -> bool {
    Regex::new(pattern).is_ok_and(|rx| rx.is_match(value))
}
