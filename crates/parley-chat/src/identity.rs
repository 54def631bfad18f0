//! First-contact identity capture parsing.
//!
//! An unidentified session's message is tried as a comma-separated
//! `name, email, country` triple before anything is forwarded upstream.

use regex::Regex;
use std::sync::LazyLock;

/// Accepts a `local@domain.tld` shape, nothing fancier.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex"));

/// A successfully parsed identity submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentitySubmission {
    pub name: String,
    pub email: String,
    pub country: String,
}

impl IdentitySubmission {
    /// Parse free-form text as a `name, email, country` triple.
    ///
    /// Returns None unless the text splits into exactly three non-empty
    /// comma-separated fields and the middle one looks like an email
    /// address.
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return None;
        }

        let (name, email, country) = (parts[0], parts[1], parts[2]);
        if name.is_empty() || country.is_empty() || !EMAIL_RE.is_match(email) {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            email: email.to_string(),
            country: country.to_string(),
        })
    }
}
