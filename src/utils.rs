//! Utility functions and types.

use std::fmt::Debug;

/// Redacts a string by replacing all but the first and last three characters
/// with asterisks.
///
/// Short strings (fewer than 12 characters) are redacted entirely, so a
/// redacted value never narrows the search space for a short secret.
pub struct Redact<'a>(&'a str);

impl<'a> From<&'a str> for Redact<'a> {
    fn from(value: &'a str) -> Self {
        Redact(value)
    }
}

impl<'a> From<&'a String> for Redact<'a> {
    fn from(value: &'a String) -> Self {
        Redact(value.as_str())
    }
}

impl<'a> From<&'a Option<String>> for Redact<'a> {
    fn from(value: &'a Option<String>) -> Self {
        Redact(value.as_deref().unwrap_or(""))
    }
}

impl Debug for Redact<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Counted in characters so slicing never lands inside a multi-byte
        // code point.
        let length = self.0.chars().count();
        if length == 0 {
            f.write_str("EMPTY")
        } else if length < 12 {
            f.write_str("***")
        } else {
            let mut indices = self.0.char_indices();
            let head = indices.nth(3).map(|(i, _)| i).unwrap_or(0);
            let tail = indices.nth_back(2).map(|(i, _)| i).unwrap_or(0);
            f.write_str(&self.0[..head])?;
            f.write_str("***")?;
            f.write_str(&self.0[tail..])
        }
    }
}
