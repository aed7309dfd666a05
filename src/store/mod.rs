//! License table access.

pub mod connection;
pub mod gateway;

pub use gateway::{LicenseQuery, LicenseStore};
