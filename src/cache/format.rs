//! Activation slot record format.
//!
//! The slot holds two string entries, `CurrentKey` and `Expiration`, kept
//! under those names on disk so the file reads like the key-value store it
//! models.

use crate::LicensingError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Contents of one product's activation slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// The activated key.
    #[serde(rename = "CurrentKey", default, skip_serializing_if = "Option::is_none")]
    pub current_key: Option<String>,

    /// Expiration of the activated key as `YYYY-MM-DD`, for display only.
    #[serde(rename = "Expiration", default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl ActivationRecord {
    /// Record for a freshly activated key.
    pub fn activated(key: &str, expiration: NaiveDate) -> Self {
        Self {
            current_key: Some(key.to_string()),
            expiration: Some(expiration.format("%Y-%m-%d").to_string()),
        }
    }

    /// The activated key, treating an empty entry as none.
    pub fn key(&self) -> Option<&str> {
        self.current_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Whether the slot holds nothing.
    pub fn is_empty(&self) -> bool {
        self.key().is_none() && self.expiration.as_deref().map_or(true, str::is_empty)
    }

    /// Serialize the record to JSON.
    pub fn to_json(&self) -> Result<String, LicensingError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LicensingError::CacheIO(format!("Failed to serialize activation: {}", e)))
    }

    /// Deserialize a record from JSON.
    pub fn from_json(json: &str) -> Result<Self, LicensingError> {
        serde_json::from_str(json)
            .map_err(|e| LicensingError::CacheIO(format!("Failed to parse activation: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activated_record_uses_entry_names() {
        let record = ActivationRecord::activated(
            "AAAAA-AAAAA-AAAAA-AAAAA-AAAAA",
            NaiveDate::from_ymd_opt(2024, 9, 6).unwrap(),
        );
        let json = record.to_json().unwrap();
        assert!(json.contains(r#""CurrentKey": "AAAAA-AAAAA-AAAAA-AAAAA-AAAAA""#));
        assert!(json.contains(r#""Expiration": "2024-09-06""#));
        assert_eq!(ActivationRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn empty_key_counts_as_none() {
        let record = ActivationRecord::from_json(r#"{"CurrentKey": ""}"#).unwrap();
        assert_eq!(record.key(), None);
        assert!(record.is_empty());
    }

    #[test]
    fn missing_entries_default_to_none() {
        let record = ActivationRecord::from_json("{}").unwrap();
        assert_eq!(record, ActivationRecord::default());
        assert!(record.is_empty());
    }

    #[test]
    fn malformed_json_is_cache_error() {
        let result = ActivationRecord::from_json("not json");
        assert!(matches!(result, Err(LicensingError::CacheIO(_))));
    }
}
