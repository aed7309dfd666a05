//! Validation verdicts returned to callers.

use crate::model::license::{License, LicenseType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a license can currently grant access, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseUsability {
    /// The license exists, is not expired and has a free device slot.
    Usable,
    /// No license has this key.
    NotFound,
    /// The expiration date is in the past.
    Expired,
    /// Every device slot is taken.
    TooManyDevices,
    /// No key is activated on this machine.
    NoConfiguredLicense,
}

impl LicenseUsability {
    /// Whether this verdict grants access.
    pub fn is_usable(&self) -> bool {
        matches!(self, LicenseUsability::Usable)
    }
}

impl fmt::Display for LicenseUsability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LicenseUsability::Usable => "usable",
            LicenseUsability::NotFound => "not found",
            LicenseUsability::Expired => "expired",
            LicenseUsability::TooManyDevices => "too many devices",
            LicenseUsability::NoConfiguredLicense => "no configured license",
        };
        f.write_str(text)
    }
}

/// License attributes exposed for a usable license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseDetails {
    /// Canonical key.
    pub key: String,
    /// Edition granted.
    pub license_type: LicenseType,
    /// Last valid day.
    pub expiration: NaiveDate,
    /// Maximum number of devices.
    pub max_devices: i16,
}

/// Verdict on a license plus its details when usable.
///
/// Details are only ever present for [`LicenseUsability::Usable`]; for any
/// other verdict every accessor returns `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    usability: LicenseUsability,
    details: Option<LicenseDetails>,
}

impl LicenseInfo {
    /// Info for a license row with the given verdict.
    pub(crate) fn from_license(license: &License, usability: LicenseUsability) -> Self {
        if !usability.is_usable() {
            return Self::without_details(usability);
        }
        Self {
            usability,
            details: Some(LicenseDetails {
                key: license.key.clone(),
                license_type: license.license_type,
                expiration: license.expiration,
                max_devices: license.max_devices,
            }),
        }
    }

    /// Info that carries only a verdict.
    pub(crate) fn without_details(usability: LicenseUsability) -> Self {
        Self {
            usability,
            details: None,
        }
    }

    /// The verdict.
    pub fn usability(&self) -> LicenseUsability {
        self.usability
    }

    /// Whether the license can be used.
    pub fn is_usable(&self) -> bool {
        self.usability.is_usable()
    }

    /// All details at once.
    pub fn details(&self) -> Option<&LicenseDetails> {
        self.details.as_ref()
    }

    /// The license key.
    pub fn key(&self) -> Option<&str> {
        self.details.as_ref().map(|d| d.key.as_str())
    }

    /// The license edition.
    pub fn license_type(&self) -> Option<LicenseType> {
        self.details.as_ref().map(|d| d.license_type)
    }

    /// The expiration date.
    pub fn expiration(&self) -> Option<NaiveDate> {
        self.details.as_ref().map(|d| d.expiration)
    }

    /// The maximum number of devices.
    pub fn max_devices(&self) -> Option<i16> {
        self.details.as_ref().map(|d| d.max_devices)
    }
}
