//! License Admin - issues, changes and revokes licenses.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::key::format::validate_key_format;
use crate::key::generator::generate_unique_key;
use crate::key::key_prefix;
use crate::model::info::{LicenseInfo, LicenseUsability};
use crate::model::license::{License, LicenseType};
use crate::store::{LicenseQuery, LicenseStore};
use crate::validator::LicenseValidator;
use crate::{LicensingError, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

/// Fields to change on an existing license. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseUpdate {
    /// New expiration date.
    pub expiration: Option<NaiveDate>,
    /// New edition.
    pub license_type: Option<LicenseType>,
    /// New device limit. Must not drop below the devices in use.
    pub max_devices: Option<i16>,
}

impl LicenseUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expiration date.
    pub fn expiration(mut self, expiration: NaiveDate) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Set the edition.
    pub fn license_type(mut self, license_type: LicenseType) -> Self {
        self.license_type = Some(license_type);
        self
    }

    /// Set the device limit.
    pub fn max_devices(mut self, max_devices: i16) -> Self {
        self.max_devices = Some(max_devices);
        self
    }

    /// Apply the update to `license`, or change nothing if the device
    /// limit would fall below the devices in use.
    fn apply_to(&self, license: &mut License) -> Result<()> {
        if let Some(max) = self.max_devices {
            if max < license.using_devices {
                return Err(LicensingError::OutOfRange(format!(
                    "max devices {} is less than the {} devices in use",
                    max, license.using_devices
                )));
            }
        }

        if let Some(expiration) = self.expiration {
            license.expiration = expiration;
        }
        if let Some(license_type) = self.license_type {
            license.license_type = license_type;
        }
        if let Some(max) = self.max_devices {
            license.max_devices = max;
        }
        Ok(())
    }
}

fn check_max_devices(max_devices: i16) -> Result<()> {
    if max_devices < 1 {
        return Err(LicensingError::OutOfRange(format!(
            "max devices must be at least 1, got {}",
            max_devices
        )));
    }
    Ok(())
}

/// Administrative access to the license table.
///
/// Cloning is cheap and shares the database connection.
#[derive(Clone)]
pub struct LicensingAdmin {
    config: StoreConfig,
    store: LicenseStore,
    clock: Arc<dyn Clock>,
}

impl LicensingAdmin {
    /// Connect to the license database.
    ///
    /// # Errors
    /// - `ConfigError` - the configuration is invalid
    /// - `StorageFailure` - the database cannot be opened
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an admin with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_clock(config, clock)
    }

    fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = LicenseStore::open(&config)?;
        Ok(Self {
            config,
            store,
            clock,
        })
    }

    /// Open an admin on the same database as `validator`.
    pub fn from_validator(validator: &LicenseValidator) -> Result<Self> {
        Self::with_clock(validator.config().clone(), Arc::clone(validator.clock()))
    }

    /// Open a validator on the same database as this admin.
    pub fn validator(&self) -> Result<LicenseValidator> {
        let store = LicenseStore::open(&self.config)?;
        Ok(LicenseValidator::from_parts(
            self.config.clone(),
            store,
            Arc::clone(&self.clock),
        ))
    }

    /// Verdict on a license from its expiration alone.
    ///
    /// Uses the validator's calendar rule, so the expiration day itself is
    /// still usable. Device counts are not considered: a license is never
    /// "full" from the admin's point of view.
    fn usability_of(&self, license: &License) -> LicenseUsability {
        if license.is_expired(self.clock.today()) {
            LicenseUsability::Expired
        } else {
            LicenseUsability::Usable
        }
    }

    fn info_for(&self, license: &License) -> LicenseInfo {
        LicenseInfo::from_license(license, self.usability_of(license))
    }

    /// Issue a new license with a freshly generated key.
    ///
    /// # Errors
    /// - `Disposed` - the admin was closed
    /// - `OutOfRange` - `max_devices` is less than 1
    /// - `GenerationExhausted` - five generated keys in a row already existed
    /// - `StorageFailure` - the insert failed
    pub fn create_license(
        &self,
        expiration: NaiveDate,
        license_type: LicenseType,
        max_devices: i16,
    ) -> Result<LicenseInfo> {
        self.store.ensure_open()?;
        check_max_devices(max_devices)?;

        let key = generate_unique_key(&mut rand::thread_rng(), |candidate| {
            self.store.contains(candidate)
        })?;

        let license = License::new(key, expiration, license_type, max_devices);
        self.store.add(&license)?;

        info!(
            key_prefix = key_prefix(&license.key),
            %license_type,
            %expiration,
            max_devices,
            "Created license"
        );
        Ok(self.info_for(&license))
    }

    /// Change some fields of an existing license.
    ///
    /// The update is all-or-nothing: when `max_devices` is rejected no other
    /// field is applied either.
    ///
    /// # Errors
    /// - `Disposed` - the admin was closed
    /// - `InvalidFormat` - the key is not canonical
    /// - `OutOfRange` - `max_devices` is less than 1 or below the devices in use
    /// - `StorageFailure` - the lookup or update failed
    pub fn update_license(&self, key: &str, update: &LicenseUpdate) -> Result<LicenseInfo> {
        self.store.ensure_open()?;
        validate_key_format(key)?;
        if let Some(max) = update.max_devices {
            check_max_devices(max)?;
        }

        let Some(mut license) = self.store.find(key)? else {
            return Ok(LicenseInfo::without_details(LicenseUsability::NotFound));
        };

        update.apply_to(&mut license)?;
        self.store.update(&license)?;

        info!(key_prefix = key_prefix(key), ?update, "Updated license");
        Ok(self.info_for(&license))
    }

    /// Revoke a license.
    ///
    /// Returns the verdict the license had before it was removed.
    ///
    /// # Errors
    /// - `Disposed` - the admin was closed
    /// - `InvalidFormat` - the key is not canonical
    /// - `StorageFailure` - the lookup or delete failed
    pub fn delete_license(&self, key: &str) -> Result<LicenseInfo> {
        self.store.ensure_open()?;
        validate_key_format(key)?;

        let Some(license) = self.store.find(key)? else {
            return Ok(LicenseInfo::without_details(LicenseUsability::NotFound));
        };

        let info = self.info_for(&license);
        self.store.remove(&license)?;

        info!(key_prefix = key_prefix(key), "Deleted license");
        Ok(info)
    }

    /// Remove every license that expired on or before `cutoff`.
    ///
    /// Returns how many licenses were removed.
    pub fn delete_expired_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let removed = self
            .store
            .remove_matching(&LicenseQuery::ExpiringOnOrBefore(cutoff))?;
        info!(%cutoff, removed, "Deleted old licenses");
        Ok(removed)
    }

    /// Remove every license that expired `days` or more days ago.
    pub fn delete_expired_days_ago(&self, days: u16) -> Result<usize> {
        let cutoff = self.clock.today() - chrono::Duration::days(i64::from(days));
        debug!(days, %cutoff, "Computed deletion cutoff");
        self.delete_expired_before(cutoff)
    }

    /// List licenses for administration tooling.
    pub fn find_licenses(&self, query: &LicenseQuery) -> Result<Vec<License>> {
        self.store.query(query)
    }

    /// Create a license on a blocking worker thread.
    pub async fn create_license_async(
        &self,
        expiration: NaiveDate,
        license_type: LicenseType,
        max_devices: i16,
    ) -> Result<LicenseInfo> {
        let admin = self.clone();
        tokio::task::spawn_blocking(move || {
            admin.create_license(expiration, license_type, max_devices)
        })
        .await
        .map_err(|e| LicensingError::Worker(e.to_string()))?
    }

    /// Update a license on a blocking worker thread.
    pub async fn update_license_async(&self, key: &str, update: LicenseUpdate) -> Result<LicenseInfo> {
        let admin = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || admin.update_license(&key, &update))
            .await
            .map_err(|e| LicensingError::Worker(e.to_string()))?
    }

    /// Delete a license on a blocking worker thread.
    pub async fn delete_license_async(&self, key: &str) -> Result<LicenseInfo> {
        let admin = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || admin.delete_license(&key))
            .await
            .map_err(|e| LicensingError::Worker(e.to_string()))?
    }

    /// The configuration this admin was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Release the database connection.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        admin: LicensingAdmin,
        validator: LicenseValidator,
    }

    fn fixture(today: &str) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StoreConfig::sqlite(dir.path().join("licenses.db").to_string_lossy());
        let clock: Arc<dyn Clock> = Arc::new(MockClock::from_ymd(today));
        let admin = LicensingAdmin::new_with_clock(config.clone(), Arc::clone(&clock)).unwrap();
        let validator = LicenseValidator::new_with_clock(config, clock).unwrap();
        Fixture {
            _dir: dir,
            admin,
            validator,
        }
    }

    fn set_using_devices(fx: &Fixture, key: &str, using: i16) {
        let mut license = fx.validator.store().find(key).unwrap().unwrap();
        license.using_devices = using;
        fx.validator.store().update(&license).unwrap();
    }

    #[test]
    fn create_then_validate_matches() {
        let fx = fixture("2024-01-01");
        let created = fx
            .admin
            .create_license(date(2024, 9, 6), LicenseType::Professional, 10)
            .unwrap();
        assert_eq!(created.usability(), LicenseUsability::Usable);

        let info = fx.validator.validate(created.key().unwrap()).unwrap();
        assert_eq!(info.usability(), LicenseUsability::Usable);
        assert_eq!(info.license_type(), Some(LicenseType::Professional));
        assert_eq!(info.expiration(), Some(date(2024, 9, 6)));
        assert_eq!(info.max_devices(), Some(10));
    }

    #[test]
    fn create_starts_with_no_devices() {
        let fx = fixture("2024-01-01");
        let created = fx.admin.create_license(date(2025, 1, 1), LicenseType::Trial, 1).unwrap();
        let row = fx.validator.store().find(created.key().unwrap()).unwrap().unwrap();
        assert_eq!(row.using_devices, 0);
    }

    #[test]
    fn create_rejects_non_positive_max_devices() {
        let fx = fixture("2024-01-01");
        for max in [0, -1, i16::MIN] {
            let result = fx.admin.create_license(date(2025, 1, 1), LicenseType::Trial, max);
            assert!(matches!(result, Err(LicensingError::OutOfRange(_))));
        }
        assert!(fx.admin.find_licenses(&LicenseQuery::All).unwrap().is_empty());
    }

    #[test]
    fn expiration_day_is_usable_for_admin_and_validator() {
        let fx = fixture("2024-01-01");
        let created = fx.admin.create_license(date(2024, 1, 1), LicenseType::Trial, 1).unwrap();
        assert_eq!(created.usability(), LicenseUsability::Usable);

        let key = created.key().unwrap().to_string();
        assert_eq!(
            fx.validator.validate(&key).unwrap().usability(),
            LicenseUsability::Usable
        );

        let updated = fx
            .admin
            .update_license(&key, &LicenseUpdate::new().expiration(date(2023, 12, 31)))
            .unwrap();
        assert_eq!(updated.usability(), LicenseUsability::Expired);
    }

    #[test]
    fn create_in_the_past_reports_expired() {
        let fx = fixture("2024-01-01");
        let created = fx.admin.create_license(date(2023, 1, 1), LicenseType::Trial, 1).unwrap();
        assert_eq!(created.usability(), LicenseUsability::Expired);
        assert!(created.key().is_none());
    }

    #[test]
    fn update_changes_only_given_fields() {
        let fx = fixture("2024-01-01");
        let created = fx
            .admin
            .create_license(date(2024, 9, 6), LicenseType::Professional, 10)
            .unwrap();
        let key = created.key().unwrap().to_string();

        let update = LicenseUpdate::new()
            .expiration(date(2024, 4, 5))
            .license_type(LicenseType::General);
        let updated = fx.admin.update_license(&key, &update).unwrap();
        assert_eq!(updated.usability(), LicenseUsability::Usable);

        let info = fx.validator.validate(&key).unwrap();
        assert_eq!(info.expiration(), Some(date(2024, 4, 5)));
        assert_eq!(info.license_type(), Some(LicenseType::General));
        assert_eq!(info.max_devices(), Some(10));
    }

    #[test]
    fn update_into_the_past_becomes_expired() {
        let fx = fixture("2024-01-01");
        let created = fx
            .admin
            .create_license(date(2024, 9, 6), LicenseType::Professional, 10)
            .unwrap();
        let key = created.key().unwrap().to_string();

        let update = LicenseUpdate::new()
            .expiration(date(2023, 4, 5))
            .license_type(LicenseType::General);
        let updated = fx.admin.update_license(&key, &update).unwrap();
        assert_eq!(updated.usability(), LicenseUsability::Expired);

        let info = fx.validator.validate(&key).unwrap();
        assert_eq!(info.usability(), LicenseUsability::Expired);

        let row = fx.validator.store().find(&key).unwrap().unwrap();
        assert_eq!(row.expiration, date(2023, 4, 5));
        assert_eq!(row.license_type, LicenseType::General);
        assert_eq!(row.max_devices, 10);
    }

    #[test]
    fn update_missing_key_is_not_found() {
        let fx = fixture("2024-01-01");
        let info = fx
            .admin
            .update_license("ZZZZZ-ZZZZZ-ZZZZZ-ZZZZZ-ZZZZZ", &LicenseUpdate::new().max_devices(4))
            .unwrap();
        assert_eq!(info.usability(), LicenseUsability::NotFound);
    }

    #[test]
    fn update_below_using_devices_changes_nothing() {
        let fx = fixture("2024-01-01");
        let created = fx.admin.create_license(date(2025, 1, 1), LicenseType::Trial, 5).unwrap();
        let key = created.key().unwrap().to_string();
        set_using_devices(&fx, &key, 3);

        let update = LicenseUpdate::new()
            .expiration(date(2030, 1, 1))
            .license_type(LicenseType::Professional)
            .max_devices(2);
        let result = fx.admin.update_license(&key, &update);
        assert!(matches!(result, Err(LicensingError::OutOfRange(_))));

        let info = fx.validator.validate(&key).unwrap();
        assert_eq!(info.expiration(), Some(date(2025, 1, 1)));
        assert_eq!(info.license_type(), Some(LicenseType::Trial));
        assert_eq!(info.max_devices(), Some(5));
    }

    #[test]
    fn update_to_exactly_using_devices_is_allowed() {
        let fx = fixture("2024-01-01");
        let created = fx.admin.create_license(date(2025, 1, 1), LicenseType::Trial, 5).unwrap();
        let key = created.key().unwrap().to_string();
        set_using_devices(&fx, &key, 3);

        fx.admin.update_license(&key, &LicenseUpdate::new().max_devices(3)).unwrap();
        let info = fx.validator.validate(&key).unwrap();
        assert_eq!(info.usability(), LicenseUsability::TooManyDevices);
    }

    #[test]
    fn update_checks_arguments_before_lookup() {
        let fx = fixture("2024-01-01");
        assert!(matches!(
            fx.admin.update_license("nope", &LicenseUpdate::new()),
            Err(LicensingError::InvalidFormat)
        ));
        assert!(matches!(
            fx.admin
                .update_license("ZZZZZ-ZZZZZ-ZZZZZ-ZZZZZ-ZZZZZ", &LicenseUpdate::new().max_devices(0)),
            Err(LicensingError::OutOfRange(_))
        ));
    }

    #[test]
    fn closed_admin_reports_disposed_before_argument_errors() {
        let fx = fixture("2024-01-01");
        fx.admin.close().unwrap();
        assert!(matches!(
            fx.admin.create_license(date(2025, 1, 1), LicenseType::Trial, 0),
            Err(LicensingError::Disposed)
        ));
        assert!(matches!(
            fx.admin.update_license("nope", &LicenseUpdate::new()),
            Err(LicensingError::Disposed)
        ));
        assert!(matches!(
            fx.admin
                .update_license("AAAAA-AAAAA-AAAAA-AAAAA-AAAAA", &LicenseUpdate::new().max_devices(0)),
            Err(LicensingError::Disposed)
        ));
        assert!(matches!(
            fx.admin.delete_license("bad"),
            Err(LicensingError::Disposed)
        ));
    }

    #[test]
    fn delete_then_validate_is_not_found() {
        let fx = fixture("2024-01-01");
        let created = fx.admin.create_license(date(2025, 1, 1), LicenseType::General, 3).unwrap();
        let key = created.key().unwrap().to_string();

        let deleted = fx.admin.delete_license(&key).unwrap();
        assert_eq!(deleted, created);

        let info = fx.validator.validate(&key).unwrap();
        assert_eq!(info.usability(), LicenseUsability::NotFound);
    }

    #[test]
    fn delete_missing_is_not_found() {
        let fx = fixture("2024-01-01");
        let info = fx.admin.delete_license("ZZZZZ-ZZZZZ-ZZZZZ-ZZZZZ-ZZZZZ").unwrap();
        assert_eq!(info.usability(), LicenseUsability::NotFound);
    }

    #[test]
    fn delete_old_licenses_uses_inclusive_cutoff() {
        let fx = fixture("2024-03-15");
        let store = fx.validator.store();
        for (key, expiration) in [
            ("BBBBB-BBBBB-BBBBB-BBBBB-BBBBB", date(2024, 3, 1)),
            ("CCCCC-CCCCC-CCCCC-CCCCC-CCCCC", date(2024, 3, 10)),
            ("DDDDD-DDDDD-DDDDD-DDDDD-DDDDD", date(2024, 3, 12)),
        ] {
            store
                .add(&License::new(key.to_string(), expiration, LicenseType::Trial, 1))
                .unwrap();
        }

        let before_b = fx.validator.validate("BBBBB-BBBBB-BBBBB-BBBBB-BBBBB").unwrap();
        assert_eq!(before_b.usability(), LicenseUsability::Expired);

        // today - 5 days = 2024-03-10
        let removed = fx.admin.delete_expired_days_ago(5).unwrap();
        assert_eq!(removed, 2);

        let b = fx.validator.validate("BBBBB-BBBBB-BBBBB-BBBBB-BBBBB").unwrap();
        let c = fx.validator.validate("CCCCC-CCCCC-CCCCC-CCCCC-CCCCC").unwrap();
        let d = fx.validator.validate("DDDDD-DDDDD-DDDDD-DDDDD-DDDDD").unwrap();
        assert_eq!(b.usability(), LicenseUsability::NotFound);
        assert_eq!(c.usability(), LicenseUsability::NotFound);
        assert_eq!(d.usability(), LicenseUsability::Expired);
    }

    #[test]
    fn validator_and_admin_share_configuration() {
        let fx = fixture("2024-01-01");
        let admin = LicensingAdmin::from_validator(&fx.validator).unwrap();
        assert_eq!(admin.config(), fx.admin.config());

        let created = admin.create_license(date(2025, 1, 1), LicenseType::General, 2).unwrap();
        let validator = admin.validator().unwrap();
        assert!(validator.validate(created.key().unwrap()).unwrap().is_usable());
    }

    #[test]
    fn closed_admin_is_disposed() {
        let fx = fixture("2024-01-01");
        fx.admin.close().unwrap();
        assert!(matches!(
            fx.admin.create_license(date(2025, 1, 1), LicenseType::Trial, 1),
            Err(LicensingError::Disposed)
        ));
        assert!(matches!(
            fx.admin.delete_expired_days_ago(7),
            Err(LicensingError::Disposed)
        ));
        // The validator has its own connection.
        assert!(fx.validator.validate("AAAAA-AAAAA-AAAAA-AAAAA-AAAAA").is_ok());
    }

    #[tokio::test]
    async fn async_wrappers_round_trip() {
        let fx = fixture("2024-01-01");
        let created = fx
            .admin
            .create_license_async(date(2025, 1, 1), LicenseType::General, 4)
            .await
            .unwrap();
        let key = created.key().unwrap().to_string();

        let updated = fx
            .admin
            .update_license_async(&key, LicenseUpdate::new().max_devices(6))
            .await
            .unwrap();
        assert_eq!(updated.max_devices(), Some(6));

        let deleted = fx.admin.delete_license_async(&key).await.unwrap();
        assert!(deleted.is_usable());
        assert_eq!(
            fx.validator.validate(&key).unwrap().usability(),
            LicenseUsability::NotFound
        );
    }
}
