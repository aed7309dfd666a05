//! Opening database connections for each flavor.

use crate::config::{DbFlavor, StoreConfig};
use crate::{LicensingError, Result};
use rusqlite::Connection;
use std::time::Duration;
use tracing::debug;

/// How long a writer waits on another process's lock before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Descriptor that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Open a connection described by `config`.
pub fn open(config: &StoreConfig) -> Result<Connection> {
    config.validate()?;

    let conn = if config.database == IN_MEMORY {
        Connection::open_in_memory()
    } else {
        Connection::open(&config.database)
    }
    .map_err(|e| LicensingError::storage("opening the license database", e))?;

    apply_flavor(&conn, &config.flavor)?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| LicensingError::storage("configuring the license database", e))?;

    debug!(database = %config.database, flavor = ?config.flavor, "Opened license database");
    Ok(conn)
}

#[cfg(feature = "sqlcipher")]
fn apply_flavor(conn: &Connection, flavor: &DbFlavor) -> Result<()> {
    match flavor {
        DbFlavor::Sqlite => Ok(()),
        DbFlavor::SqlCipher {
            passphrase,
            compatibility,
        } => {
            // The key pragma has to run before anything touches the file.
            conn.pragma_update(None, "key", passphrase.as_str())
                .map_err(|e| LicensingError::storage("keying the license database", e))?;
            if let Some(version) = compatibility {
                conn.pragma_update(None, "cipher_compatibility", *version)
                    .map_err(|e| LicensingError::storage("keying the license database", e))?;
            }
            Ok(())
        }
    }
}

#[cfg(not(feature = "sqlcipher"))]
fn apply_flavor(_conn: &Connection, flavor: &DbFlavor) -> Result<()> {
    match flavor {
        DbFlavor::Sqlite => Ok(()),
        DbFlavor::SqlCipher { .. } => Err(LicensingError::ConfigError(
            "sqlcipher flavor requires the `sqlcipher` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory() {
        let conn = open(&StoreConfig::sqlite(IN_MEMORY)).unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn opens_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("licenses.db");
        open(&StoreConfig::sqlite(path.to_string_lossy())).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unreachable_path_is_storage_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("licenses.db");
        let result = open(&StoreConfig::sqlite(path.to_string_lossy()));
        assert!(matches!(result, Err(LicensingError::StorageFailure { .. })));
    }

    #[test]
    fn sqlcipher_without_version_fails_before_opening() {
        let result = open(&StoreConfig::sqlcipher(IN_MEMORY, "secret", None));
        assert!(matches!(result, Err(LicensingError::ConfigError(_))));
    }

    #[cfg(not(feature = "sqlcipher"))]
    #[test]
    fn sqlcipher_needs_feature() {
        let result = open(&StoreConfig::sqlcipher(IN_MEMORY, "secret", Some(4)));
        assert!(matches!(result, Err(LicensingError::ConfigError(msg)) if msg.contains("feature")));
    }
}
