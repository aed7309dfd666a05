//! Activation key error types.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by storage failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LicensingError>;

/// Errors that can occur while issuing, validating or activating licenses.
///
/// A license that does not exist is never an error: lookups report it as
/// [`LicenseUsability::NotFound`](crate::LicenseUsability::NotFound).
#[derive(Debug, Error)]
pub enum LicensingError {
    /// The license database could not be opened, queried or written.
    ///
    /// Mutations are single statements, so a failure never leaves a row
    /// partially updated.
    #[error("License database error while {operation}: {source}")]
    StorageFailure {
        /// What the store was doing when it failed.
        operation: &'static str,
        /// The underlying database error.
        #[source]
        source: BoxError,
    },

    /// The key does not have the `XXXXX-XXXXX-XXXXX-XXXXX-XXXXX` shape.
    #[error("Invalid key format, expected XXXXX-XXXXX-XXXXX-XXXXX-XXXXX where X is a letter or a digit")]
    InvalidFormat,

    /// A device count is outside its allowed range.
    #[error("Device count out of range: {0}")]
    OutOfRange(String),

    /// The key generator hit too many existing keys in a row.
    #[error("Cannot generate a unique key, too many attempts; retry the operation")]
    GenerationExhausted,

    /// The component was closed and its connection released.
    #[error("Operation on a closed licensing component")]
    Disposed,

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The local activation cache could not be opened.
    #[error("Cannot access activation cache at {}: {source}", path.display())]
    CacheAccess {
        /// Location that could not be opened.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the local activation cache failed.
    #[error("Activation cache I/O error: {0}")]
    CacheIO(String),

    /// A blocking worker used by an async wrapper did not complete.
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl LicensingError {
    /// Wrap a storage-layer error.
    pub(crate) fn storage<E>(operation: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::StorageFailure {
            operation,
            source: source.into(),
        }
    }
}
