//! Activation of a license on the local machine.
//!
//! The `LicensingClient` ties the license database to the local activation
//! slot of one product:
//! - activate a key (taking a device slot) and remember it locally
//! - deactivate (releasing the device slot)
//! - report whether the remembered key is still usable

use crate::cache::file::FileActivationStore;
use crate::cache::format::ActivationRecord;
use crate::cache::ActivationStore;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::key::format::validate_key_format;
use crate::key::key_prefix;
use crate::model::info::{LicenseInfo, LicenseUsability};
use crate::store::LicenseStore;
use crate::validator::LicenseValidator;
use crate::{LicensingError, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Per-machine activation client for one product.
///
/// Cloning is cheap; clones share the database connection and the
/// product name.
#[derive(Clone)]
pub struct LicensingClient {
    validator: LicenseValidator,
    cache: Arc<dyn ActivationStore>,
    product_name: Arc<Mutex<String>>,
}

impl LicensingClient {
    /// Create a client that keeps its activation slot in the machine-wide
    /// directory (see [`default_root`](crate::cache::file::default_root)).
    ///
    /// # Errors
    /// - `ConfigError` - the configuration or product name is invalid
    /// - `StorageFailure` - the license database cannot be opened
    /// - `CacheAccess` - the activation slot cannot be opened
    pub fn new(config: StoreConfig, product_name: &str) -> Result<Self> {
        let cache = FileActivationStore::new()?;
        Self::build(config, product_name, Arc::new(cache), Arc::new(SystemClock))
    }

    /// Create a client with a custom activation store.
    pub fn with_cache(
        config: StoreConfig,
        product_name: &str,
        cache: Arc<dyn ActivationStore>,
    ) -> Result<Self> {
        Self::build(config, product_name, cache, Arc::new(SystemClock))
    }

    /// Create a client with a custom activation store and clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: StoreConfig,
        product_name: &str,
        cache: Arc<dyn ActivationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::build(config, product_name, cache, clock)
    }

    fn build(
        config: StoreConfig,
        product_name: &str,
        cache: Arc<dyn ActivationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = LicenseStore::open(&config)?;
        cache.open(product_name)?;

        Ok(Self {
            validator: LicenseValidator::from_parts(config, store, clock),
            cache,
            product_name: Arc::new(Mutex::new(product_name.to_string())),
        })
    }

    /// Open a client and run exactly one of two continuations.
    ///
    /// `on_licensed` runs only when the activated license is
    /// [`LicenseUsability::Usable`]; otherwise `on_not_licensed` runs with
    /// the verdict. This is the intended bootstrap for host applications.
    pub fn start<R, L, N>(
        config: StoreConfig,
        product_name: &str,
        on_licensed: L,
        on_not_licensed: N,
    ) -> Result<R>
    where
        L: FnOnce(LicensingClient) -> R,
        N: FnOnce(LicensingClient, LicenseUsability) -> R,
    {
        Self::new(config, product_name)?.run_if_licensed(on_licensed, on_not_licensed)
    }

    /// Run `on_licensed` if the activated license is usable, otherwise
    /// `on_not_licensed`.
    pub fn run_if_licensed<R, L, N>(self, on_licensed: L, on_not_licensed: N) -> Result<R>
    where
        L: FnOnce(LicensingClient) -> R,
        N: FnOnce(LicensingClient, LicenseUsability) -> R,
    {
        let usability = self.current_license()?.usability();
        if usability == LicenseUsability::Usable {
            Ok(on_licensed(self))
        } else {
            info!(%usability, "Product is not licensed");
            Ok(on_not_licensed(self, usability))
        }
    }

    fn namespace(&self) -> Result<String> {
        self.product_name
            .lock()
            .map(|name| name.clone())
            .map_err(|_| LicensingError::CacheIO("product name lock poisoned".to_string()))
    }

    fn cached_key(&self, namespace: &str) -> Result<Option<String>> {
        Ok(self
            .cache
            .load(namespace)?
            .and_then(|record| record.key().map(str::to_string)))
    }

    /// Activate `key` on this machine.
    ///
    /// When the license is usable its device count goes up by one and the
    /// key is remembered locally. The validation verdict is returned either
    /// way, so callers can tell why an activation did not happen.
    ///
    /// # Errors
    /// - `InvalidFormat` - the key is not canonical
    /// - `StorageFailure` - the database lookup or update failed
    /// - `CacheIO` - the key could not be written locally
    /// - `Disposed` - the client was closed
    pub fn activate(&self, key: &str) -> Result<LicenseInfo> {
        let (license, verdict) = self.validator.evaluate(key)?;

        match license {
            Some(mut license) if verdict.is_usable() => {
                license.using_devices += 1;
                self.validator.store().update(&license)?;

                let namespace = self.namespace()?;
                self.cache
                    .save(&namespace, &ActivationRecord::activated(key, license.expiration))?;

                info!(
                    key_prefix = key_prefix(key),
                    using_devices = license.using_devices,
                    max_devices = license.max_devices,
                    "Activated license"
                );
            }
            _ => {
                warn!(
                    key_prefix = key_prefix(key),
                    usability = %verdict.usability(),
                    "License not activated"
                );
            }
        }

        Ok(verdict)
    }

    /// Release the license activated on this machine.
    ///
    /// Does nothing when no key is activated. The local slot is cleared
    /// first; a license that no longer exists is ignored.
    pub fn deactivate(&self) -> Result<()> {
        self.validator.store().ensure_open()?;

        let namespace = self.namespace()?;
        let Some(key) = self.cached_key(&namespace)? else {
            debug!(namespace = %namespace, "No activated license to release");
            return Ok(());
        };

        self.cache.clear(&namespace)?;

        if validate_key_format(&key).is_err() {
            warn!("Cleared malformed activated key");
            return Ok(());
        }

        let store = self.validator.store();
        let Some(mut license) = store.find(&key)? else {
            debug!(key_prefix = key_prefix(&key), "Activated license no longer exists");
            return Ok(());
        };

        if license.using_devices > 0 {
            license.using_devices -= 1;
            store.update(&license)?;
        }

        info!(
            key_prefix = key_prefix(&key),
            using_devices = license.using_devices,
            "Deactivated license"
        );
        Ok(())
    }

    /// Verdict on the license activated on this machine.
    ///
    /// Returns [`LicenseUsability::NoConfiguredLicense`] when nothing is
    /// activated; otherwise the key is re-validated against the database.
    pub fn current_license(&self) -> Result<LicenseInfo> {
        self.validator.store().ensure_open()?;

        let namespace = self.namespace()?;
        match self.cached_key(&namespace)? {
            None => Ok(LicenseInfo::without_details(
                LicenseUsability::NoConfiguredLicense,
            )),
            Some(key) => self.validator.validate(&key),
        }
    }

    /// The product name namespacing the activation slot.
    pub fn product_name(&self) -> Result<String> {
        self.validator.store().ensure_open()?;
        self.namespace()
    }

    /// Rename the product, moving the activation slot along with it.
    pub fn set_product_name(&self, product_name: &str) -> Result<()> {
        self.validator.store().ensure_open()?;

        let mut current = self
            .product_name
            .lock()
            .map_err(|_| LicensingError::CacheIO("product name lock poisoned".to_string()))?;

        self.cache.rename(&current, product_name)?;
        self.cache.open(product_name)?;

        debug!(from = %current, to = product_name, "Renamed product");
        *current = product_name.to_string();
        Ok(())
    }

    /// The validator this client checks keys with.
    pub fn validator(&self) -> &LicenseValidator {
        &self.validator
    }

    /// The configuration this client was opened with.
    pub fn config(&self) -> &StoreConfig {
        self.validator.config()
    }

    /// Activate on a blocking worker thread.
    pub async fn activate_async(&self, key: &str) -> Result<LicenseInfo> {
        let client = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || client.activate(&key))
            .await
            .map_err(|e| LicensingError::Worker(e.to_string()))?
    }

    /// Deactivate on a blocking worker thread.
    pub async fn deactivate_async(&self) -> Result<()> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.deactivate())
            .await
            .map_err(|e| LicensingError::Worker(e.to_string()))?
    }

    /// Fetch the current license on a blocking worker thread.
    pub async fn current_license_async(&self) -> Result<LicenseInfo> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.current_license())
            .await
            .map_err(|e| LicensingError::Worker(e.to_string()))?
    }

    /// Release the database connection.
    ///
    /// Every later call fails with [`LicensingError::Disposed`].
    pub fn close(&self) -> Result<()> {
        self.validator.close()
    }
}
