//! Contact identities
//!
//! RCS addresses remote parties by phone number. A [`ContactId`] is the
//! normalised `+<digits>` form, resolved from `tel:`/`sip:` URIs, name-addr
//! headers or raw dialled numbers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

const MIN_DIGITS: usize = 7;
const MAX_DIGITS: usize = 15;

/// Normalised phone-number identity of a remote party
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(String);

impl ContactId {
    /// Resolve a contact from a raw phone number
    ///
    /// Visual separators (spaces, dashes, dots, brackets) are ignored.
    pub fn from_number(number: &str) -> Option<Self> {
        let trimmed = number.trim();
        let digits_part = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let mut digits = String::with_capacity(digits_part.len());
        for c in digits_part.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return None,
            }
        }
        if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
            return None;
        }
        Some(ContactId(format!("+{}", digits)))
    }

    /// Resolve a contact from a URI or header value
    ///
    /// Handles `tel:` and `sip:`/`sips:` URIs, optionally enclosed in angle
    /// brackets with a display name, and bare numbers.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let mut value = uri.trim();
        if let Some(start) = value.find('<') {
            let rest = &value[start + 1..];
            value = match rest.find('>') {
                Some(end) => &rest[..end],
                None => rest,
            };
        }
        let value = value.trim();
        let lower = value.to_ascii_lowercase();
        let user = if lower.starts_with("tel:") {
            &value[4..]
        } else if lower.starts_with("sip:") || lower.starts_with("sips:") {
            let after_scheme = &value[value.find(':').map_or(0, |i| i + 1)..];
            match after_scheme.find('@') {
                Some(at) => &after_scheme[..at],
                None => after_scheme,
            }
        } else {
            value
        };
        let user = user.split(';').next().unwrap_or(user);
        Self::from_number(user)
    }

    /// The normalised number, including the leading `+`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Format as a `tel:` URI
    pub fn to_uri(&self) -> String {
        format!("tel:{}", self.0)
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContactId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s).ok_or_else(|| CodecError::malformed_document(format!("not a contact: {}", s)))
    }
}

impl AsRef<str> for ContactId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
