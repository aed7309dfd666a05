//! Activation key shape and generation.

pub mod format;
pub mod generator;

/// Length of a canonical key, hyphens included.
pub const KEY_LENGTH: usize = 29;

/// Number of hyphen-separated groups in a key.
pub const GROUP_COUNT: usize = 5;

/// Characters per group.
pub const GROUP_LENGTH: usize = 5;

/// Log-safe prefix of a key.
pub(crate) fn key_prefix(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}
