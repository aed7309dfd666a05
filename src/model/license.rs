//! Persisted license rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Edition a license grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseType {
    /// Time-limited evaluation license.
    Trial,
    /// Standard license.
    General,
    /// Full-featured license.
    Professional,
}

impl LicenseType {
    /// Label stored in the `Type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseType::Trial => "Trial",
            LicenseType::General => "General",
            LicenseType::Professional => "Professional",
        }
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a license type label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLicenseType(pub String);

impl fmt::Display for UnknownLicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown license type {:?}", self.0)
    }
}

impl std::error::Error for UnknownLicenseType {}

impl FromStr for LicenseType {
    type Err = UnknownLicenseType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trial" => Ok(LicenseType::Trial),
            "general" => Ok(LicenseType::General),
            "professional" => Ok(LicenseType::Professional),
            _ => Err(UnknownLicenseType(s.to_string())),
        }
    }
}

/// One row of the `Licenses` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Canonical 29-character key. Never changes after creation.
    pub key: String,

    /// Last calendar day the license is valid on.
    pub expiration: NaiveDate,

    /// Edition granted by the license.
    pub license_type: LicenseType,

    /// Maximum number of simultaneously activated devices (1..=32767).
    pub max_devices: i16,

    /// Number of devices currently activated.
    pub using_devices: i16,
}

impl License {
    /// A fresh license with no activated devices.
    pub fn new(key: String, expiration: NaiveDate, license_type: LicenseType, max_devices: i16) -> Self {
        Self {
            key,
            expiration,
            license_type,
            max_devices,
            using_devices: 0,
        }
    }

    /// Whether the license ran out before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration < today
    }

    /// Whether every device slot is taken.
    pub fn is_full(&self) -> bool {
        self.using_devices >= self.max_devices
    }
}
