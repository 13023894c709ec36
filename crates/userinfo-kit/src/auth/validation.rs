//! Credential and profile-field validation.
//!
//! The patterns match what the hosted backend enforces; they are not meant to
//! be exhaustive RFC validation.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,64}$").expect("email regex")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}-?\d{3}-?\d{4}$").expect("phone regex"));

// 2-20 chars total, words of letters/digits/#$& separated by single spaces.
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9#$&]+( [A-Za-z0-9#$&]+)*$").expect("name regex"));

pub fn is_email_valid(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Minimum length only; complexity rules were dropped upstream.
pub fn is_password_valid(password: &str) -> bool {
    password.len() >= 8
}

pub fn is_phone_valid(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub fn is_name_valid(name: &str) -> bool {
    (2..=20).contains(&name.len()) && NAME_RE.is_match(name)
}
