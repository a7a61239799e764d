//! Per-location index: base name -> concrete record names
//!
//! The index is authoritative for presence. It is updated incrementally on
//! every create/delete and never rebuilt from a scan of record bodies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationIndex {
    buckets: BTreeMap<String, Vec<String>>,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buckets.values().any(|names| names.iter().any(|n| n == name))
    }

    /// Append `name` to the bucket of `base_name`; false if already present
    pub fn insert(&mut self, base_name: &str, name: &str) -> bool {
        let bucket = self.buckets.entry(base_name.to_string()).or_default();
        if bucket.iter().any(|n| n == name) {
            return false;
        }
        bucket.push(name.to_string());
        true
    }

    /// Remove `name` from whichever bucket holds it, dropping emptied buckets
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(base_name) = self
            .buckets
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == name))
            .map(|(base, _)| base.clone())
        else {
            return false;
        };

        if let Some(names) = self.buckets.get_mut(&base_name) {
            names.retain(|n| n != name);
            if names.is_empty() {
                self.buckets.remove(&base_name);
            }
        }
        true
    }

    pub fn bucket(&self, base_name: &str) -> &[String] {
        self.buckets.get(base_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All concrete names, bucket by bucket
    pub fn names(&self) -> Vec<String> {
        self.buckets.values().flatten().cloned().collect()
    }

    pub fn base_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
