//! Per-extension settings stored as one JSON file per extension id.
//!
//! A record is created from the manifest's schema defaults the first time it
//! is read. Writes are shallow merges validated against the schema and
//! applied under the file's exclusive lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use forum_fs::{ConfigStore, FileLock, NormalizedPath, RobustnessConfig, io};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::manifest::{ExtensionManifest, ExtensionType, is_valid_id};
use crate::schema::{ConfigSchema, ValidationReport};
use crate::store::ManifestStore;

/// Stored configuration of one extension.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionConfigRecord {
    pub extension_id: String,
    pub extension_name: String,
    pub extension_type: ExtensionType,
    pub enabled: bool,
    #[serde(default)]
    pub user_config: Map<String, Value>,
    #[serde(default)]
    pub default_config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<ConfigSchema>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtensionConfigRecord {
    /// A fresh record whose user config equals the schema defaults.
    pub fn from_manifest(manifest: &ExtensionManifest, now: DateTime<Utc>) -> Self {
        let defaults = manifest
            .config_schema
            .as_ref()
            .map(ConfigSchema::defaults)
            .unwrap_or_default();
        Self {
            extension_id: manifest.id.clone(),
            extension_name: manifest.name.clone(),
            extension_type: manifest.extension_type,
            enabled: manifest.enabled,
            user_config: defaults.clone(),
            default_config: defaults,
            schema: manifest.config_schema.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh fields derived from the manifest, leaving user config alone.
    fn refresh_from(&mut self, manifest: &ExtensionManifest) {
        self.extension_name = manifest.name.clone();
        self.extension_type = manifest.extension_type;
        self.enabled = manifest.enabled;
        self.default_config = manifest
            .config_schema
            .as_ref()
            .map(ConfigSchema::defaults)
            .unwrap_or_default();
        self.schema = manifest.config_schema.clone();
    }

    fn adopt_derived(&mut self, current: &Self) {
        self.extension_name = current.extension_name.clone();
        self.extension_type = current.extension_type;
        self.enabled = current.enabled;
        self.default_config = current.default_config.clone();
        self.schema = current.schema.clone();
    }

    /// Validate the stored user config against the record's schema.
    pub fn validate_user_config(&self) -> ValidationReport {
        self.schema
            .clone()
            .unwrap_or_default()
            .validate(&Value::Object(self.user_config.clone()))
    }
}

/// Reads and writes `<configs_dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct ExtensionConfigStore {
    dir: NormalizedPath,
    manifests: Arc<ManifestStore>,
    files: ConfigStore,
}

impl ExtensionConfigStore {
    pub fn new(dir: impl Into<NormalizedPath>, manifests: Arc<ManifestStore>) -> Self {
        let files = ConfigStore::with_robustness(manifests.robustness());
        Self {
            dir: dir.into(),
            manifests,
            files,
        }
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.files = ConfigStore::with_robustness(robustness);
        self
    }

    pub fn dir(&self) -> &NormalizedPath {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> Result<NormalizedPath> {
        if !is_valid_id(id) {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(self.dir.join(&format!("{id}.json")))
    }

    /// Load the record for `id`, creating it from schema defaults on first
    /// read.
    ///
    /// A corrupt file is reported as a parse error until
    /// [`reset`](Self::reset) rebuilds it.
    pub fn get(&self, id: &str) -> Result<ExtensionConfigRecord> {
        let path = self.path_for(id)?;
        if let Some(mut record) = self.files.load_optional::<ExtensionConfigRecord>(&path)? {
            if let Ok(manifest) = self.manifests.read_manifest(id) {
                record.refresh_from(&manifest);
            }
            debug!(extension_id = %id, "Loaded extension configuration");
            return Ok(record);
        }

        let manifest = self.manifests.read_manifest(id)?;
        let record = ExtensionConfigRecord::from_manifest(&manifest, Utc::now());
        self.files.save(&path, &record)?;
        info!(extension_id = %id, "Created default extension configuration");
        Ok(record)
    }

    /// Shallow-merge `patch` into the user config.
    ///
    /// The merged result must pass schema validation or nothing is written.
    pub fn set(&self, id: &str, patch: Map<String, Value>) -> Result<ExtensionConfigRecord> {
        let record = self.update(id, |record| {
            record.user_config.extend(patch);
            let report = record.validate_user_config();
            if report.is_valid {
                Ok(())
            } else {
                Err(Error::InvalidConfig {
                    id: id.to_string(),
                    errors: report.errors,
                })
            }
        })?;
        info!(extension_id = %id, "Updated extension configuration");
        Ok(record)
    }

    /// Replace the user config with the schema defaults.
    ///
    /// An unreadable file is replaced by a fresh record built from the
    /// manifest.
    pub fn reset(&self, id: &str) -> Result<ExtensionConfigRecord> {
        let outcome = self.update(id, |record| {
            record.user_config = record.default_config.clone();
            Ok(())
        });
        let record = match outcome {
            Err(Error::Parse { path, message }) if path == self.path_for(id)?.to_native() => {
                warn!(extension_id = %id, error = %message, "Replacing unreadable extension configuration");
                self.rebuild(id)?
            }
            other => other?,
        };
        info!(extension_id = %id, "Reset extension configuration to defaults");
        Ok(record)
    }

    fn rebuild(&self, id: &str) -> Result<ExtensionConfigRecord> {
        let manifest = self.manifests.read_manifest(id)?;
        let path = self.path_for(id)?;
        let robustness = self.files.robustness();
        let lock = FileLock::exclusive(&path, robustness)?;

        let record = ExtensionConfigRecord::from_manifest(&manifest, Utc::now());
        let content = ConfigStore::render(&path, &record)?;
        lock.replace(content.as_bytes(), robustness)?;
        Ok(record)
    }

    /// Check a candidate config against the extension's schema without
    /// storing anything.
    pub fn validate(&self, id: &str, candidate: &Value) -> Result<ValidationReport> {
        let schema = match self.manifests.read_manifest(id) {
            Ok(manifest) => manifest.config_schema,
            Err(e) => match self
                .files
                .load_optional::<ExtensionConfigRecord>(&self.path_for(id)?)?
            {
                Some(record) => record.schema,
                None => return Err(e),
            },
        };
        Ok(schema.unwrap_or_default().validate(candidate))
    }

    /// Remove the stored record. Returns whether one existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        let removed = io::remove_file_if_exists(&path)?;
        io::remove_file_if_exists(&NormalizedPath::new(format!("{path}.lock")))?;
        if removed {
            info!(extension_id = %id, "Deleted extension configuration");
        }
        Ok(removed)
    }

    fn update(
        &self,
        id: &str,
        f: impl FnOnce(&mut ExtensionConfigRecord) -> Result<()>,
    ) -> Result<ExtensionConfigRecord> {
        let current = self.get(id)?;
        let path = self.path_for(id)?;
        let robustness = self.files.robustness();
        let lock = FileLock::exclusive(&path, robustness)?;

        let mut record = self
            .files
            .load_optional::<ExtensionConfigRecord>(&path)?
            .unwrap_or_else(|| current.clone());
        record.adopt_derived(&current);
        f(&mut record)?;
        record.updated_at = Utc::now();

        let content = ConfigStore::render(&path, &record)?;
        lock.replace(content.as_bytes(), robustness)?;
        Ok(record)
    }
}
