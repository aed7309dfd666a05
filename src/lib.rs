//! # activation-keys
//!
//! **Database-backed activation keys with a local activation cache.**
//!
//! Licenses live in one relational table and are identified by random keys
//! of the form `XXXXX-XXXXX-XXXXX-XXXXX-XXXXX`. Three components share one
//! [`StoreConfig`]:
//!
//! - [`LicenseValidator`]: tells whether a key is usable right now
//! - [`LicensingAdmin`]: issues, updates and revokes licenses
//! - [`LicensingClient`]: activates a key on this machine and remembers it
//!
//! ## Quickstart
//!
//! ```no_run
//! use activation_keys::{LicenseType, LicensingAdmin, LicensingClient, StoreConfig};
//! use chrono::NaiveDate;
//!
//! fn main() -> Result<(), activation_keys::LicensingError> {
//!     let config = StoreConfig::sqlite("/var/lib/myapp/licenses.db");
//!
//!     let admin = LicensingAdmin::new(config.clone())?;
//!     let issued = admin.create_license(
//!         NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
//!         LicenseType::Professional,
//!         3,
//!     )?;
//!     let key = issued.key().unwrap_or_default().to_string();
//!
//!     let client = LicensingClient::new(config, "MyApp")?;
//!     let info = client.activate(&key)?;
//!     println!("activation: {}", info.usability());
//!     Ok(())
//! }
//! ```
//!
//! ## Verdicts
//!
//! A lookup never fails just because a key is unknown; it yields a
//! [`LicenseInfo`] whose [`LicenseUsability`] is one of `Usable`,
//! `NotFound`, `Expired`, `TooManyDevices` or (client only)
//! `NoConfiguredLicense`. Details are only present for usable licenses.
//!
//! ## Start-up gate
//!
//! [`LicensingClient::start`] opens a client and runs exactly one of two
//! continuations depending on whether a usable license is activated.

#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Data model
pub mod model;

// Key format and generation
pub mod key;

// Storage layer
pub mod store;

// Local activation cache
pub mod cache;

// Components
pub mod admin;
pub mod client;
pub mod validator;

// Re-exports for public API
pub use admin::{LicenseUpdate, LicensingAdmin};
pub use cache::file::FileActivationStore;
pub use cache::format::ActivationRecord;
pub use cache::ActivationStore;
pub use client::LicensingClient;
pub use clock::{Clock, SystemClock};
pub use config::{DbFlavor, StoreConfig};
pub use errors::{LicensingError, Result};
pub use key::format::{is_valid_key, validate_key_format};
pub use model::info::{LicenseDetails, LicenseInfo, LicenseUsability};
pub use model::license::{License, LicenseType};
pub use store::{LicenseQuery, LicenseStore};
pub use validator::LicenseValidator;

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
