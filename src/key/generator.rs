//! Random key generation with a bounded uniqueness retry.

use crate::key::{GROUP_COUNT, GROUP_LENGTH, KEY_LENGTH};
use crate::LicensingError;
use rand::Rng;
use tracing::{debug, warn};

/// Symbols a key is drawn from.
const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Consecutive collisions tolerated before giving up.
pub const MAX_ATTEMPTS: usize = 5;

/// Build one random candidate key.
pub fn generate_key<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut key = String::with_capacity(KEY_LENGTH);
    for group in 0..GROUP_COUNT {
        if group > 0 {
            key.push('-');
        }
        for _ in 0..GROUP_LENGTH {
            let idx = rng.gen_range(0..ALPHABET.len());
            key.push(ALPHABET[idx] as char);
        }
    }
    key
}

/// Generate a key for which `exists` reports `false`.
///
/// Gives up with [`LicensingError::GenerationExhausted`] after
/// [`MAX_ATTEMPTS`] collisions; callers re-invoke explicitly if they want
/// to keep trying. Errors from `exists` are returned as-is.
pub fn generate_unique_key<R, F>(rng: &mut R, mut exists: F) -> Result<String, LicensingError>
where
    R: Rng + ?Sized,
    F: FnMut(&str) -> Result<bool, LicensingError>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let candidate = generate_key(rng);
        if !exists(&candidate)? {
            debug!(attempt, "Generated unique license key");
            return Ok(candidate);
        }
        debug!(attempt, "Generated key already exists, retrying");
    }

    warn!(attempts = MAX_ATTEMPTS, "Key generation exhausted");
    Err(LicensingError::GenerationExhausted)
}
