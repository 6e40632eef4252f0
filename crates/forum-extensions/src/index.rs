//! The root `extensions.json` index.
//!
//! The index mirrors the installed set so the admin surface can list
//! extensions whose manifests are missing or corrupt. A monotonically
//! increasing `revision` lets writers detect lost updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::{ExtensionManifest, ExtensionType};

/// One installed extension as recorded in the index.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub extension_type: ExtensionType,
    pub version: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_by: Option<String>,
    /// `sha256:<hex>` of the archive the extension was installed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl IndexEntry {
    /// Mirror a manifest's identity and enabled flag.
    pub fn from_manifest(manifest: &ExtensionManifest) -> Self {
        Self {
            id: manifest.id.clone(),
            name: manifest.name.clone(),
            extension_type: manifest.extension_type,
            version: manifest.version.clone(),
            enabled: manifest.enabled,
            installed_at: None,
            installed_by: None,
            checksum: None,
        }
    }

    /// Refresh mirrored fields from a manifest, keeping install metadata.
    pub fn sync_from(&mut self, manifest: &ExtensionManifest) {
        self.name = manifest.name.clone();
        self.extension_type = manifest.extension_type;
        self.version = manifest.version.clone();
        self.enabled = manifest.enabled;
    }
}

/// Parsed `extensions.json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExtensionIndex {
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub extensions: Vec<IndexEntry>,
}

/// On-disk shapes accepted when reading.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum IndexFile {
    Legacy(Vec<IndexEntry>),
    Current(ExtensionIndex),
}

impl From<IndexFile> for ExtensionIndex {
    fn from(file: IndexFile) -> Self {
        match file {
            IndexFile::Legacy(extensions) => Self {
                revision: 0,
                extensions,
            },
            IndexFile::Current(index) => index,
        }
    }
}

impl ExtensionIndex {
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.extensions.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut IndexEntry> {
        self.extensions.iter_mut().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert or replace the entry with the same id.
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self.get_mut(&entry.id) {
            Some(existing) => *existing = entry,
            None => self.extensions.push(entry),
        }
    }

    /// Mirror a manifest into its entry, creating one if absent.
    pub fn record(&mut self, manifest: &ExtensionManifest) {
        match self.get_mut(&manifest.id) {
            Some(existing) => existing.sync_from(manifest),
            None => self.extensions.push(IndexEntry::from_manifest(manifest)),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        let pos = self.extensions.iter().position(|e| e.id == id)?;
        Some(self.extensions.remove(pos))
    }
}
