//! SQLite-backed gateway to the `Licenses` table.
//!
//! Every failure of the underlying database (unreachable file, locked
//! database, schema mismatch) is reported as
//! [`LicensingError::StorageFailure`] with the underlying error attached.
//! Each mutation is one SQL statement, so it either applies fully or not at
//! all.

use crate::config::StoreConfig;
use crate::key::key_prefix;
use crate::model::license::{License, LicenseType};
use crate::store::connection;
use crate::{LicensingError, Result};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Key looked up on open to make sure the table is reachable.
const PROBE_KEY: &str = "AAAAA-AAAAA-AAAAA-AAAAA-AAAAA";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS "Licenses" (
        "Key" CHAR(29) PRIMARY KEY NOT NULL,
        "Expiration" DATE NOT NULL,
        "Type" VARCHAR(12) NOT NULL,
        "MaxDevices" SMALLINT NOT NULL,
        "UsingDevices" SMALLINT NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS "IX_Licenses_Expiration" ON "Licenses" ("Expiration");
"#;

const SELECT_COLUMNS: &str =
    r#"SELECT "Key", "Expiration", "Type", "MaxDevices", "UsingDevices" FROM "Licenses""#;

/// Selection of license rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseQuery {
    /// Every license.
    All,
    /// Licenses whose expiration is on or before the date.
    ExpiringOnOrBefore(NaiveDate),
}

/// Gateway to the license table.
///
/// Clones share one connection. After [`close`](Self::close) every
/// operation on any clone fails with [`LicensingError::Disposed`].
#[derive(Clone)]
pub struct LicenseStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl LicenseStore {
    /// Open the database described by `config`, creating the table if it
    /// is missing.
    ///
    /// # Errors
    /// - `ConfigError` - the configuration is invalid
    /// - `StorageFailure` - the database cannot be opened or queried
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = connection::open(config)?;
        Self::from_connection(conn)
    }

    /// Wrap an already opened connection.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        };
        store.init_schema()?;

        // Fail now rather than on first real use.
        store.find(PROBE_KEY)?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.with_conn("creating the license table", |conn| {
            conn.execute_batch(SCHEMA)
        })
    }

    /// Run `f` against the open connection.
    fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| LicensingError::storage(operation, "connection lock poisoned"))?;
        let conn = guard.as_ref().ok_or(LicensingError::Disposed)?;
        f(conn).map_err(|e| LicensingError::storage(operation, e))
    }

    /// Fail with `Disposed` if the store has been closed.
    pub fn ensure_open(&self) -> Result<()> {
        self.with_conn("checking the connection", |_| Ok(()))
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        match self.conn.lock() {
            Ok(guard) => guard.is_none(),
            Err(_) => true,
        }
    }

    /// Release the connection. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| LicensingError::storage("closing", "connection lock poisoned"))?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| LicensingError::storage("closing the license database", e))?;
            debug!("Closed license database");
        }
        Ok(())
    }

    /// Look up a license by key.
    pub fn find(&self, key: &str) -> Result<Option<License>> {
        self.with_conn("finding a license", |conn| {
            conn.query_row(
                &format!(r#"{} WHERE "Key" = ?1"#, SELECT_COLUMNS),
                params![key],
                row_to_license,
            )
            .optional()
        })
    }

    /// Whether a license with this key exists.
    pub fn contains(&self, key: &str) -> Result<bool> {
        self.with_conn("checking a license key", |conn| {
            conn.query_row(
                r#"SELECT EXISTS(SELECT 1 FROM "Licenses" WHERE "Key" = ?1)"#,
                params![key],
                |row| row.get(0),
            )
        })
    }

    /// Insert a new license.
    pub fn add(&self, license: &License) -> Result<()> {
        self.with_conn("adding a license", |conn| {
            conn.execute(
                r#"INSERT INTO "Licenses" ("Key", "Expiration", "Type", "MaxDevices", "UsingDevices")
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![
                    license.key,
                    license.expiration,
                    license.license_type.as_str(),
                    license.max_devices,
                    license.using_devices,
                ],
            )
        })?;
        debug!(key_prefix = key_prefix(&license.key), "Added license");
        Ok(())
    }

    /// Persist every mutable field of `license`.
    ///
    /// Concurrent writers are last-write-wins.
    pub fn update(&self, license: &License) -> Result<()> {
        let changed = self.with_conn("updating a license", |conn| {
            conn.execute(
                r#"UPDATE "Licenses"
                   SET "Expiration" = ?2, "Type" = ?3, "MaxDevices" = ?4, "UsingDevices" = ?5
                   WHERE "Key" = ?1"#,
                params![
                    license.key,
                    license.expiration,
                    license.license_type.as_str(),
                    license.max_devices,
                    license.using_devices,
                ],
            )
        })?;
        if changed == 0 {
            warn!(key_prefix = key_prefix(&license.key), "Updated license no longer exists");
        }
        Ok(())
    }

    /// Delete a license.
    pub fn remove(&self, license: &License) -> Result<()> {
        self.with_conn("removing a license", |conn| {
            conn.execute(r#"DELETE FROM "Licenses" WHERE "Key" = ?1"#, params![license.key])
        })?;
        debug!(key_prefix = key_prefix(&license.key), "Removed license");
        Ok(())
    }

    /// Fetch the licenses selected by `query`, ordered by key.
    pub fn query(&self, query: &LicenseQuery) -> Result<Vec<License>> {
        self.with_conn("querying licenses", |conn| match query {
            LicenseQuery::All => {
                let mut stmt = conn.prepare(&format!(r#"{} ORDER BY "Key""#, SELECT_COLUMNS))?;
                let rows = stmt.query_map([], row_to_license)?;
                rows.collect()
            }
            LicenseQuery::ExpiringOnOrBefore(cutoff) => {
                let mut stmt = conn.prepare(&format!(
                    r#"{} WHERE "Expiration" <= ?1 ORDER BY "Key""#,
                    SELECT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![cutoff], row_to_license)?;
                rows.collect()
            }
        })
    }

    /// Delete every license selected by `query` in one statement.
    ///
    /// Returns the number of removed rows.
    pub fn remove_matching(&self, query: &LicenseQuery) -> Result<usize> {
        let removed = self.with_conn("removing licenses", |conn| match query {
            LicenseQuery::All => conn.execute(r#"DELETE FROM "Licenses""#, []),
            LicenseQuery::ExpiringOnOrBefore(cutoff) => conn.execute(
                r#"DELETE FROM "Licenses" WHERE "Expiration" <= ?1"#,
                params![cutoff],
            ),
        })?;
        debug!(removed, ?query, "Removed licenses");
        Ok(removed)
    }
}

fn row_to_license(row: &Row<'_>) -> rusqlite::Result<License> {
    let type_label: String = row.get(2)?;
    let license_type = type_label
        .parse::<LicenseType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(License {
        key: row.get(0)?,
        expiration: row.get(1)?,
        license_type,
        max_devices: row.get(3)?,
        using_devices: row.get(4)?,
    })
}
