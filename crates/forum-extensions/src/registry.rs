//! Discovery of installed extensions and the unified admin listing.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use forum_fs::NormalizedPath;
use serde::Serialize;
use tracing::{debug, warn};

use crate::MANIFEST_FILENAME;
use crate::error::{Error, Result};
use crate::index::IndexEntry;
use crate::manifest::{Capabilities, ExtensionManifest, ExtensionType};
use crate::store::ManifestStore;

/// A manifest found on disk together with its directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredExtension {
    pub manifest: ExtensionManifest,
    pub path: NormalizedPath,
}

/// A directory whose manifest could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub directory: String,
    pub message: String,
}

/// Result of one pass over the extensions root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub extensions: Vec<DiscoveredExtension>,
    pub failures: Vec<LoadFailure>,
}

/// Display status derived from the enabled flag and load outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionStatus {
    Active,
    Inactive,
    Error,
    Loading,
}

/// One row of the admin listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    #[serde(rename = "type")]
    pub extension_type: ExtensionType,
    pub enabled: bool,
    pub status: ExtensionStatus,
    pub capabilities: Capabilities,
    pub has_config_schema: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegistryEntry {
    fn discovered(ext: &DiscoveredExtension, indexed: Option<&IndexEntry>, loading: bool) -> Self {
        let m = &ext.manifest;
        let status = if loading {
            ExtensionStatus::Loading
        } else if m.enabled {
            ExtensionStatus::Active
        } else {
            ExtensionStatus::Inactive
        };
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            version: m.version.clone(),
            author: m.author.clone(),
            description: m.description.clone(),
            extension_type: m.extension_type,
            enabled: m.enabled,
            status,
            capabilities: m.capabilities.clone(),
            has_config_schema: m.config_schema.is_some(),
            path: Some(ext.path.to_string()),
            installed_at: indexed.and_then(|e| e.installed_at),
            installed_by: indexed.and_then(|e| e.installed_by.clone()),
            error: None,
        }
    }

    fn broken(indexed: &IndexEntry, message: String, loading: bool) -> Self {
        Self {
            id: indexed.id.clone(),
            name: indexed.name.clone(),
            version: indexed.version.clone(),
            author: String::new(),
            description: String::new(),
            extension_type: indexed.extension_type,
            enabled: indexed.enabled,
            status: if loading {
                ExtensionStatus::Loading
            } else {
                ExtensionStatus::Error
            },
            capabilities: Capabilities::default(),
            has_config_schema: false,
            path: None,
            installed_at: indexed.installed_at,
            installed_by: indexed.installed_by.clone(),
            error: Some(message),
        }
    }
}

/// Aggregate counts over the admin listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub error: usize,
    pub loading: usize,
    pub plugins: usize,
    pub themes: usize,
}

impl ExtensionStats {
    pub fn from_entries(entries: &[RegistryEntry]) -> Self {
        let mut stats = Self {
            total: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            match entry.status {
                ExtensionStatus::Active => stats.active += 1,
                ExtensionStatus::Inactive => stats.inactive += 1,
                ExtensionStatus::Error => stats.error += 1,
                ExtensionStatus::Loading => stats.loading += 1,
            }
            match entry.extension_type {
                ExtensionType::Plugin => stats.plugins += 1,
                ExtensionType::Theme => stats.themes += 1,
            }
        }
        stats
    }
}

/// In-memory view of the extensions root, keyed by id.
///
/// The cache is rebuilt by [`refresh`](Self::refresh); the lifecycle manager
/// refreshes after every transition.
#[derive(Debug)]
pub struct ExtensionRegistry {
    store: Arc<ManifestStore>,
    cache: RwLock<BTreeMap<String, DiscoveredExtension>>,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks an id as `Loading` until dropped.
#[derive(Debug)]
pub struct LoadingGuard<'a> {
    registry: &'a ExtensionRegistry,
    id: String,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl ExtensionRegistry {
    pub fn new(store: Arc<ManifestStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(BTreeMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }

    /// List the extensions root without touching the cache.
    ///
    /// Hidden and staging directories, and directories without a
    /// `manifest.json`, are skipped. Directories whose manifest fails to
    /// load are reported in [`ScanReport::failures`]. Order follows the
    /// filesystem listing.
    pub fn scan(&self) -> Result<ScanReport> {
        let root = self.store.root();
        let native_root = root.to_native();
        let listing = match std::fs::read_dir(&native_root) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ScanReport::default());
            }
            Err(e) => return Err(Error::io(native_root, e)),
        };

        let mut report = ScanReport::default();
        for entry in listing {
            let entry = entry.map_err(|e| Error::io(&native_root, e))?;
            let directory = entry.file_name().to_string_lossy().into_owned();
            if directory.starts_with('.') {
                continue;
            }
            let path = root.join(&directory);
            if !path.is_dir() || !path.join(MANIFEST_FILENAME).is_file() {
                continue;
            }

            match self.store.read_manifest_at(&path) {
                Ok(manifest) if self.store.directory_name(&manifest.id) != directory => {
                    report.failures.push(LoadFailure {
                        message: format!(
                            "manifest declares id '{}' which does not belong in directory '{directory}'",
                            manifest.id
                        ),
                        directory,
                    });
                }
                Ok(manifest) => report.extensions.push(DiscoveredExtension { manifest, path }),
                Err(e) => report.failures.push(LoadFailure {
                    directory,
                    message: e.to_string(),
                }),
            }
        }
        Ok(report)
    }

    /// Rescan the root and rebuild the cache.
    pub fn refresh(&self) -> Result<ScanReport> {
        let report = self.scan()?;
        let fresh: BTreeMap<_, _> = report
            .extensions
            .iter()
            .map(|ext| (ext.manifest.id.clone(), ext.clone()))
            .collect();
        debug!(
            discovered = fresh.len(),
            failed = report.failures.len(),
            "Refreshed extension registry"
        );
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(report)
    }

    /// Manifests of every loadable extension. Load failures are logged.
    pub fn discover(&self) -> Result<Vec<ExtensionManifest>> {
        let report = self.refresh()?;
        for failure in &report.failures {
            warn!(directory = %failure.directory, error = %failure.message, "Skipping extension");
        }
        Ok(report.extensions.into_iter().map(|e| e.manifest).collect())
    }

    /// Cached entry for `id` as of the last refresh.
    pub fn get(&self, id: &str) -> Option<DiscoveredExtension> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Map an id to its existing directory, via alias or direct match.
    pub fn resolve(&self, id: &str) -> Result<NormalizedPath> {
        let dir = self.store.extension_dir(id)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(Error::NotFound(id.to_string()))
        }
    }

    /// Unified listing: discovered manifests joined with index entries.
    ///
    /// Indexed ids without a loadable manifest are listed with status
    /// `Error`. Sorted by type, then name.
    pub fn entries(&self) -> Result<Vec<RegistryEntry>> {
        let report = self.refresh()?;
        let index = self.store.read_index()?;
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(report.extensions.len());
        for ext in &report.extensions {
            let id = &ext.manifest.id;
            entries.push(RegistryEntry::discovered(
                ext,
                index.get(id),
                in_flight.contains(id),
            ));
            seen.insert(id.clone());
        }

        for indexed in index.extensions.iter().filter(|e| !seen.contains(&e.id)) {
            let directory = self.store.directory_name(&indexed.id);
            let message = report
                .failures
                .iter()
                .find(|f| f.directory == directory)
                .map(|f| f.message.clone())
                .unwrap_or_else(|| "manifest not found".to_string());
            entries.push(RegistryEntry::broken(
                indexed,
                message,
                in_flight.contains(&indexed.id),
            ));
        }

        entries.sort_by(|a, b| {
            (a.extension_type, a.name.to_lowercase(), &a.id).cmp(&(
                b.extension_type,
                b.name.to_lowercase(),
                &b.id,
            ))
        });
        Ok(entries)
    }

    /// The listing row for `id`.
    pub fn entry(&self, id: &str) -> Result<RegistryEntry> {
        self.entries()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn stats(&self) -> Result<ExtensionStats> {
        Ok(ExtensionStats::from_entries(&self.entries()?))
    }

    /// Mark `id` as loading for the lifetime of the returned guard.
    pub fn begin(&self, id: &str) -> LoadingGuard<'_> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        LoadingGuard {
            registry: self,
            id: id.to_string(),
        }
    }
}
