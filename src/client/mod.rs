//! Local Activation Client.

pub mod activation;

pub use activation::LicensingClient;
