//! Store configuration shared by the validator, admin and client.

use crate::LicensingError;
use serde::Deserialize;
use std::fmt;

/// Database flavor used for the license table.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DbFlavor {
    /// Plain SQLite database file.
    Sqlite,

    /// SQLCipher-encrypted SQLite database.
    ///
    /// Requires the `sqlcipher` cargo feature.
    SqlCipher {
        /// Passphrase used to key the database.
        passphrase: String,
        /// SQLCipher major version the database file was written with
        /// (3 or 4). Must be given explicitly.
        #[serde(default)]
        compatibility: Option<u8>,
    },
}

impl fmt::Debug for DbFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbFlavor::Sqlite => f.write_str("Sqlite"),
            DbFlavor::SqlCipher { compatibility, .. } => f
                .debug_struct("SqlCipher")
                .field("passphrase", &"<redacted>")
                .field("compatibility", compatibility)
                .finish(),
        }
    }
}

/// Connection parameters for the license database.
///
/// One value is shared by every component that talks to the same
/// database; each component opens its own connection from it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Connection descriptor: a database file path, or `:memory:`.
    pub database: String,

    /// Database flavor.
    pub flavor: DbFlavor,
}

impl StoreConfig {
    /// Configuration for a plain SQLite database.
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            flavor: DbFlavor::Sqlite,
        }
    }

    /// Configuration for a SQLCipher-encrypted database.
    pub fn sqlcipher(
        database: impl Into<String>,
        passphrase: impl Into<String>,
        compatibility: Option<u8>,
    ) -> Self {
        Self {
            database: database.into(),
            flavor: DbFlavor::SqlCipher {
                passphrase: passphrase.into(),
                compatibility,
            },
        }
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), LicensingError> {
        if self.database.is_empty() {
            return Err(LicensingError::ConfigError(
                "database cannot be empty".to_string(),
            ));
        }
        if let DbFlavor::SqlCipher {
            passphrase,
            compatibility,
        } = &self.flavor
        {
            if passphrase.is_empty() {
                return Err(LicensingError::ConfigError(
                    "sqlcipher passphrase cannot be empty".to_string(),
                ));
            }
            match compatibility {
                None => {
                    return Err(LicensingError::ConfigError(
                        "sqlcipher requires an explicit compatibility version".to_string(),
                    ))
                }
                Some(3) | Some(4) => {}
                Some(other) => {
                    return Err(LicensingError::ConfigError(format!(
                        "unsupported sqlcipher compatibility version {}",
                        other
                    )))
                }
            }
        }
        Ok(())
    }
}
