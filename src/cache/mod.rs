//! Local activation cache.
//!
//! Holds the key activated on this machine, one slot per product name.
//! The cached expiration is advisory: usability is always re-derived from
//! the license database.

pub mod file;
pub mod format;

use crate::Result;
use format::ActivationRecord;

/// Namespaced key-value storage for the activation slot.
pub trait ActivationStore: Send + Sync {
    /// Prepare the slot of `namespace` and check it is accessible.
    ///
    /// Called once when a client is created; later calls assume access.
    fn open(&self, namespace: &str) -> Result<()>;

    /// Read the slot of `namespace`, if anything is stored there.
    fn load(&self, namespace: &str) -> Result<Option<ActivationRecord>>;

    /// Replace the slot of `namespace`.
    fn save(&self, namespace: &str, record: &ActivationRecord) -> Result<()>;

    /// Empty the slot of `namespace`. Clearing an empty slot is a no-op.
    fn clear(&self, namespace: &str) -> Result<()>;

    /// Move the slot from `from` to `to` and drop `from` if it is now empty.
    fn rename(&self, from: &str, to: &str) -> Result<()>;
}
