//! Canonical key format check.

use crate::key::KEY_LENGTH;
use crate::LicensingError;
use once_cell::sync::Lazy;
use regex::Regex;

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]{5}(?:-[A-Za-z0-9]{5}){4}$").expect("static key pattern compiles")
});

/// Check that `key` has the `XXXXX-XXXXX-XXXXX-XXXXX-XXXXX` shape.
///
/// Every entry point that accepts a key runs this before touching the
/// database.
pub fn validate_key_format(key: &str) -> Result<(), LicensingError> {
    if key.len() != KEY_LENGTH || !KEY_PATTERN.is_match(key) {
        return Err(LicensingError::InvalidFormat);
    }
    Ok(())
}

/// Whether `key` has the canonical shape.
pub fn is_valid_key(key: &str) -> bool {
    validate_key_format(key).is_ok()
}
