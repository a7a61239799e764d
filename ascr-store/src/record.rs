//! Record types and document validation

use ascr_common::config::StoreSettings;
use ascr_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle partition a record resides in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Drafts being edited
    Working,
    /// Published, versioned records (append-only per base name)
    Ready,
    /// Archived records
    Historical,
}

impl Location {
    pub const ALL: [Location; 3] = [Location::Working, Location::Ready, Location::Historical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Working => "working",
            Location::Ready => "ready",
            Location::Historical => "historical",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "working" => Ok(Location::Working),
            "ready" => Ok(Location::Ready),
            "historical" => Ok(Location::Historical),
            other => Err(Error::Validation(format!("unknown location '{}'", other))),
        }
    }
}

/// A record body as read back from a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub name: String,
    pub location: Location,
    pub data: Value,
    pub last_modified: DateTime<Utc>,
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    Created,
    Updated,
}

/// Where a document keeps its human-assigned identifier
///
/// The first listed section holding a non-empty list (or an object) is used;
/// its first entry must carry a non-empty string in `field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRule {
    sections: Vec<String>,
    field: String,
}

impl Default for IdentityRule {
    fn default() -> Self {
        Self::from_settings(&StoreSettings::default())
    }
}

impl IdentityRule {
    pub fn new(sections: Vec<String>, field: impl Into<String>) -> Self {
        Self {
            sections,
            field: field.into(),
        }
    }

    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new(settings.identity_sections.clone(), settings.identity_field.clone())
    }

    /// Identifying value of `doc`, or `Validation` when it has none
    pub fn identify(&self, doc: &Value) -> Result<String> {
        let entry = self
            .sections
            .iter()
            .filter_map(|section| doc.get(section))
            .find_map(|value| match value {
                Value::Array(items) => items.first(),
                Value::Object(_) => Some(value),
                _ => None,
            });

        entry
            .and_then(|entry| entry.get(&self.field))
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "document has no {} in any of [{}]",
                    self.field,
                    self.sections.join(", ")
                ))
            })
    }
}

/// Reject names that cannot be stored as a single entry of a location
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("record name must not be empty".to_string()));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(Error::Validation(format!("invalid record name '{}'", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascr_common::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_identify_from_cell_line() {
        let rule = IdentityRule::default();
        let doc = json!({"cell_line": [{"hpscreg_name": "UKBi011-A"}], "content": "x"});
        assert_eq!(rule.identify(&doc).unwrap(), "UKBi011-A");
    }

    #[test]
    fn test_identify_falls_back_to_basic_data() {
        let rule = IdentityRule::default();
        let doc = json!({"basic_data": [{"hpscreg_name": "LEGACY01"}]});
        assert_eq!(rule.identify(&doc).unwrap(), "LEGACY01");

        let doc = json!({"cell_line": [], "basic_data": [{"hpscreg_name": "LEGACY02"}]});
        assert_eq!(rule.identify(&doc).unwrap(), "LEGACY02");
    }

    #[test]
    fn test_identify_missing_field_is_validation_failure() {
        let rule = IdentityRule::default();
        for doc in [
            json!({}),
            json!({"cell_line": []}),
            json!({"cell_line": [{}]}),
            json!({"cell_line": [{"hpscreg_name": ""}]}),
            json!({"cell_line": [{"hpscreg_name": 7}]}),
            json!("not an object"),
        ] {
            let err = rule.identify(&doc).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "doc {}", doc);
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("TestCell001_v0").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("  ").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
    }

    #[test]
    fn test_location_round_trip() {
        for location in Location::ALL {
            assert_eq!(location.as_str().parse::<Location>().unwrap(), location);
        }
        assert_eq!("archive".parse::<Location>().unwrap_err().kind(), ErrorKind::Validation);
    }
}
