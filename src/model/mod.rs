//! License records and validation verdicts.

pub mod info;
pub mod license;
