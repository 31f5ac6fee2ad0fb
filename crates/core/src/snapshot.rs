use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata records keyed by resource id, as returned by one fetch.
pub type Records = HashMap<String, ResourceRecord>;

/// Metadata of one tracked file at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "modifiedTime")]
    pub modified_time: DateTime<Utc>,
    /// Absent when the authorized user never opened the file.
    #[serde(
        rename = "viewedByMeTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub viewed_time: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    pub fn is_unviewed(&self) -> bool {
        self.viewed_time
            .is_some_and(|viewed| self.modified_time > viewed)
    }
}

/// Last observed metadata for every tracked id.
///
/// Backed by a `BTreeMap` so serialization is stable across saves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub entries: BTreeMap<String, ResourceRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ResourceRecord> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn insert(&mut self, record: ResourceRecord) {
        self.entries.insert(record.id.clone(), record);
    }

    pub fn remove(&mut self, id: &str) -> Option<ResourceRecord> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.entries.values()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// A tracked file whose modification time moved since the last cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub previous: ResourceRecord,
    pub current: ResourceRecord,
}
