//! License Validator - decides whether a key can currently be used.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::key::format::validate_key_format;
use crate::key::key_prefix;
use crate::model::info::{LicenseInfo, LicenseUsability};
use crate::model::license::License;
use crate::store::LicenseStore;
use crate::{LicensingError, Result};
use std::sync::Arc;
use tracing::debug;

/// Read-only access to license verdicts.
///
/// Cloning is cheap and shares the database connection.
#[derive(Clone)]
pub struct LicenseValidator {
    config: StoreConfig,
    store: LicenseStore,
    clock: Arc<dyn Clock>,
}

impl LicenseValidator {
    /// Connect to the license database.
    ///
    /// # Errors
    /// - `ConfigError` - the configuration is invalid
    /// - `StorageFailure` - the database cannot be opened
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a validator with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_clock(config, clock)
    }

    fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = LicenseStore::open(&config)?;
        Ok(Self::from_parts(config, store, clock))
    }

    /// Build a validator over an already opened store.
    pub(crate) fn from_parts(config: StoreConfig, store: LicenseStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    /// Determine whether `key` can currently be used.
    ///
    /// Checks, in order: key format, existence, expiration (calendar
    /// days, evaluated now), free device slots.
    ///
    /// # Errors
    /// - `Disposed` - the validator was closed
    /// - `InvalidFormat` - the key is not canonical (no database access)
    /// - `StorageFailure` - the lookup failed
    pub fn validate(&self, key: &str) -> Result<LicenseInfo> {
        let (_, info) = self.evaluate(key)?;
        Ok(info)
    }

    /// Validate and also hand back the row the verdict was derived from.
    pub(crate) fn evaluate(&self, key: &str) -> Result<(Option<License>, LicenseInfo)> {
        self.store.ensure_open()?;
        validate_key_format(key)?;

        let Some(license) = self.store.find(key)? else {
            debug!(key_prefix = key_prefix(key), "License not found");
            return Ok((None, LicenseInfo::without_details(LicenseUsability::NotFound)));
        };

        let usability = self.usability_of(&license);
        debug!(key_prefix = key_prefix(key), %usability, "Validated license");
        let info = LicenseInfo::from_license(&license, usability);
        Ok((Some(license), info))
    }

    fn usability_of(&self, license: &License) -> LicenseUsability {
        if license.is_expired(self.clock.today()) {
            LicenseUsability::Expired
        } else if license.is_full() {
            LicenseUsability::TooManyDevices
        } else {
            LicenseUsability::Usable
        }
    }

    /// Validate on a blocking worker thread.
    pub async fn validate_async(&self, key: &str) -> Result<LicenseInfo> {
        let validator = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || validator.validate(&key))
            .await
            .map_err(|e| LicensingError::Worker(e.to_string()))?
    }

    /// The configuration this validator was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &LicenseStore {
        &self.store
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Release the database connection.
    ///
    /// Every later call fails with [`LicensingError::Disposed`].
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}
