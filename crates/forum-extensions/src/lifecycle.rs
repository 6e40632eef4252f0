//! Install, enable, disable, reload, and uninstall extensions.
//!
//! [`LifecycleManager`] is the only writer of manifests and the index.
//! Operations on the same id are serialized by a per-id mutex; theme
//! activation additionally holds a theme-wide mutex, taken before any id
//! mutex, so at most one theme is ever enabled.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use forum_fs::checksum::compute_bytes_checksum;
use forum_fs::{NormalizedPath, io};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::MANIFEST_FILENAME;
use crate::archive::{self, ArchiveManifest};
use crate::config::ExtensionConfigStore;
use crate::error::{Error, Result};
use crate::index::IndexEntry;
use crate::manifest::ExtensionManifest;
use crate::registry::ExtensionRegistry;
use crate::store::ManifestStore;

/// Prefix of in-progress install directories under the extensions root.
pub const STAGING_PREFIX: &str = ".staging-";

/// What happened to an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEventKind {
    Installed,
    Uninstalled,
    Enabled,
    Disabled,
    /// A theme was enabled, deactivating any other theme.
    Activated,
}

/// Published after every successful transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ExtensionManifest>,
    pub at: DateTime<Utc>,
}

/// Policy knobs for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Ids that cannot be uninstalled.
    pub protected: BTreeSet<String>,
    /// Delete the extension's config file on uninstall.
    pub remove_config_on_uninstall: bool,
    /// Buffered events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            protected: BTreeSet::new(),
            remove_config_on_uninstall: false,
            event_capacity: 64,
        }
    }
}

/// Drives extensions through `Installed -> Enabled <-> Disabled -> Uninstalled`.
#[derive(Debug)]
pub struct LifecycleManager {
    store: Arc<ManifestStore>,
    registry: Arc<ExtensionRegistry>,
    configs: Arc<ExtensionConfigStore>,
    options: LifecycleOptions,
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    theme_lock: Mutex<()>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleManager {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        configs: Arc<ExtensionConfigStore>,
        options: LifecycleOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            store: Arc::clone(registry.store()),
            registry,
            configs,
            options,
            id_locks: Mutex::new(HashMap::new()),
            theme_lock: Mutex::new(()),
            events,
        }
    }

    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn configs(&self) -> &Arc<ExtensionConfigStore> {
        &self.configs
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// Receive every transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Install a zip archive.
    ///
    /// `expected_id`, when given, must equal the id declared by the archive's
    /// manifest. The extension is installed disabled. On any failure the
    /// extensions root is left as it was.
    pub fn install(
        &self,
        archive: &[u8],
        expected_id: Option<&str>,
        user_id: &str,
    ) -> Result<ExtensionManifest> {
        let ArchiveManifest { manifest, prefix } = archive::inspect(archive)?;
        if let Some(expected) = expected_id {
            if expected != manifest.id {
                return Err(Error::InvalidArchive(format!(
                    "archive contains extension '{}', not '{expected}'",
                    manifest.id
                )));
            }
        }

        let checksum = compute_bytes_checksum(archive);
        self.install_staged(manifest, user_id, Some(checksum), |staging| {
            let files = archive::extract(archive, prefix.as_deref(), staging)?;
            debug!(files, "Extracted extension archive");
            Ok(())
        })
    }

    /// Install by copying a local directory that contains a manifest.
    ///
    /// The source may not contain the extensions root.
    pub fn install_from_dir(&self, source: &Path, user_id: &str) -> Result<ExtensionManifest> {
        let requested = NormalizedPath::new(source);
        if !requested.join(MANIFEST_FILENAME).is_file() {
            return Err(Error::InvalidManifest {
                reason: format!("{} has no {MANIFEST_FILENAME}", source.display()),
            });
        }
        let source = requested.canonicalize()?;
        let root = self.store.root();
        std::fs::create_dir_all(root.to_native()).map_err(|e| Error::io(root.to_native(), e))?;
        if root.canonicalize()?.is_within(&source) {
            return Err(Error::InvalidManifest {
                reason: format!("{source} contains the extensions root"),
            });
        }
        let manifest =
            ExtensionManifest::from_json(&io::read_text(&source.join(MANIFEST_FILENAME))?)?;

        self.install_staged(manifest, user_id, None, |staging| {
            Ok(io::copy_dir_recursive(&source.to_native(), staging)?)
        })
    }

    fn install_staged(
        &self,
        manifest: ExtensionManifest,
        user_id: &str,
        checksum: Option<String>,
        populate: impl FnOnce(&Path) -> Result<()>,
    ) -> Result<ExtensionManifest> {
        let id = manifest.id.clone();
        self.with_id_lock(&id, || {
            self.install_locked(manifest, user_id, checksum, populate)
        })
    }

    fn install_locked(
        &self,
        mut manifest: ExtensionManifest,
        user_id: &str,
        checksum: Option<String>,
        populate: impl FnOnce(&Path) -> Result<()>,
    ) -> Result<ExtensionManifest> {
        let id = manifest.id.clone();
        let _loading = self.registry.begin(&id);

        let dest = self.store.extension_dir(&id)?;
        if dest.exists() || self.store.read_index()?.contains(&id) {
            return Err(Error::AlreadyInstalled(id));
        }

        manifest.enabled = false;
        let staging = self
            .store
            .root()
            .join(&format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        let staged = populate(&staging.to_native()).and_then(|()| {
            let content = manifest.to_json()?;
            let manifest_path = staging.join(MANIFEST_FILENAME).to_native();
            std::fs::write(&manifest_path, content).map_err(|e| Error::io(manifest_path, e))?;
            std::fs::rename(staging.to_native(), dest.to_native())
                .map_err(|e| Error::io(dest.to_native(), e))
        });
        if let Err(e) = staged {
            discard(&staging);
            warn!(extension_id = %id, error = %e, "Install failed, staging removed");
            return Err(e);
        }

        let entry = IndexEntry {
            installed_at: Some(Utc::now()),
            installed_by: Some(user_id.to_string()),
            checksum,
            ..IndexEntry::from_manifest(&manifest)
        };
        if let Err(e) = self.store.update_index(|index| {
            index.upsert(entry);
            Ok(())
        }) {
            discard(&dest);
            warn!(extension_id = %id, error = %e, "Index update failed, install rolled back");
            return Err(e);
        }

        info!(extension_id = %id, version = %manifest.version, user = %user_id, "Installed extension");
        self.publish(LifecycleEventKind::Installed, &id, Some(manifest.clone()));
        Ok(manifest)
    }

    /// Enable an extension. Enabling a theme disables every other theme.
    ///
    /// Succeeds without writing if already enabled. Themes switched off
    /// before a failure are still announced.
    pub fn enable(&self, id: &str) -> Result<ExtensionManifest> {
        let is_theme = self.store.read_manifest(id)?.is_theme();
        let _theme_guard = is_theme.then(|| {
            self.theme_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        });

        self.with_id_lock(id, || {
            let loading = self.registry.begin(id);
            let mut deactivated = Vec::new();
            let outcome = self.store.read_manifest(id).and_then(|mut manifest| {
                if manifest.is_theme() {
                    self.deactivate_themes_except(id, &mut deactivated)?;
                }
                let changed = !manifest.enabled;
                if changed {
                    manifest.enabled = true;
                    self.store.write_manifest(id, &manifest)?;
                }
                self.sync_index(&manifest)?;
                Ok((manifest, changed))
            });
            drop(loading);

            for theme in deactivated {
                let theme_id = theme.id.clone();
                self.publish(LifecycleEventKind::Disabled, &theme_id, Some(theme));
            }
            let (manifest, changed) = match outcome {
                Ok(done) => done,
                Err(e) => {
                    if let Err(refresh) = self.registry.refresh() {
                        warn!(error = %refresh, "Registry refresh failed after enable error");
                    }
                    return Err(e);
                }
            };

            if changed {
                let kind = if manifest.is_theme() {
                    LifecycleEventKind::Activated
                } else {
                    LifecycleEventKind::Enabled
                };
                info!(extension_id = %id, ?kind, "Enabled extension");
                self.publish(kind, id, Some(manifest.clone()));
            } else {
                debug!(extension_id = %id, "Extension already enabled");
            }
            Ok(manifest)
        })
    }

    /// Disable an extension. Succeeds without writing if already disabled.
    pub fn disable(&self, id: &str) -> Result<ExtensionManifest> {
        self.store.read_manifest(id)?;

        self.with_id_lock(id, || {
            let loading = self.registry.begin(id);
            let mut manifest = self.store.read_manifest(id)?;
            let changed = manifest.enabled;
            if changed {
                manifest.enabled = false;
                self.store.write_manifest(id, &manifest)?;
            }
            self.sync_index(&manifest)?;
            drop(loading);

            if changed {
                info!(extension_id = %id, "Disabled extension");
                self.publish(LifecycleEventKind::Disabled, id, Some(manifest.clone()));
            } else {
                debug!(extension_id = %id, "Extension already disabled");
            }
            Ok(manifest)
        })
    }

    /// Enable or disable depending on `enabled`.
    pub fn toggle(&self, id: &str, enabled: bool) -> Result<ExtensionManifest> {
        if enabled {
            self.enable(id)
        } else {
            self.disable(id)
        }
    }

    /// Make `id` the active theme.
    pub fn activate(&self, id: &str) -> Result<ExtensionManifest> {
        if !self.store.read_manifest(id)?.is_theme() {
            return Err(Error::NotATheme(id.to_string()));
        }
        self.enable(id)
    }

    /// Disable then enable.
    ///
    /// Both steps are durable before the next begins. If enabling fails the
    /// extension stays disabled and the error is returned.
    pub fn reload(&self, id: &str) -> Result<ExtensionManifest> {
        self.disable(id)?;
        match self.enable(id) {
            Ok(manifest) => {
                info!(extension_id = %id, "Reloaded extension");
                Ok(manifest)
            }
            Err(e) => {
                warn!(extension_id = %id, error = %e, "Reload left extension disabled");
                Err(e)
            }
        }
    }

    /// Remove an extension's directory and index entry.
    pub fn uninstall(&self, id: &str) -> Result<()> {
        if !self.is_installed(id)? {
            return Err(Error::NotFound(id.to_string()));
        }
        if self.options.protected.contains(id) {
            return Err(Error::Protected(id.to_string()));
        }

        self.with_id_lock(id, || {
            let indexed = self.store.read_index()?.contains(id);
            if !self.store.extension_dir(id)?.exists() && !indexed {
                return Err(Error::NotFound(id.to_string()));
            }
            let loading = self.registry.begin(id);
            self.store.remove_extension_dir(id)?;
            if indexed {
                self.store.update_index(|index| {
                    index.remove(id);
                    Ok(())
                })?;
            }
            if self.options.remove_config_on_uninstall {
                if let Err(e) = self.configs.delete(id) {
                    warn!(extension_id = %id, error = %e, "Failed to delete extension configuration");
                }
            }
            drop(loading);

            info!(extension_id = %id, "Uninstalled extension");
            self.publish(LifecycleEventKind::Uninstalled, id, None);
            Ok(())
        })
    }

    /// Whether `id` has a directory or an index entry.
    fn is_installed(&self, id: &str) -> Result<bool> {
        Ok(self.store.extension_dir(id)?.exists() || self.store.read_index()?.contains(id))
    }

    /// Disable every enabled theme other than `keep`.
    ///
    /// Caller holds the theme lock and `keep`'s id lock. Every theme written
    /// as disabled is pushed to `deactivated`, even when a later one fails.
    fn deactivate_themes_except(
        &self,
        keep: &str,
        deactivated: &mut Vec<ExtensionManifest>,
    ) -> Result<()> {
        for other in self.registry.discover()? {
            if other.id == keep || !other.is_theme() || !other.enabled {
                continue;
            }

            let theme = self.with_id_lock(&other.id, || -> Result<Option<ExtensionManifest>> {
                let mut current = match self.store.read_manifest(&other.id) {
                    Ok(m) => m,
                    Err(Error::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e),
                };
                if !current.enabled {
                    return Ok(None);
                }
                current.enabled = false;
                self.store.write_manifest(&current.id, &current)?;
                self.sync_index(&current)?;
                Ok(Some(current))
            })?;
            if let Some(theme) = theme {
                info!(extension_id = %theme.id, activated = %keep, "Deactivated theme");
                deactivated.push(theme);
            }
        }
        Ok(())
    }

    /// Mirror `manifest` into the index unless it already matches.
    fn sync_index(&self, manifest: &ExtensionManifest) -> Result<()> {
        let index = self.store.read_index()?;
        let in_sync = index.get(&manifest.id).is_some_and(|e| {
            e.enabled == manifest.enabled
                && e.version == manifest.version
                && e.name == manifest.name
                && e.extension_type == manifest.extension_type
        });
        if in_sync {
            return Ok(());
        }
        self.store.update_index(|index| {
            index.record(manifest);
            Ok(())
        })
    }

    /// Run `f` holding the mutex for `id`. The mutex is dropped from the map
    /// once no other caller holds or waits on it.
    fn with_id_lock<T>(&self, id: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.id_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut locks = self.id_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
        outcome
    }

    fn publish(&self, kind: LifecycleEventKind, id: &str, manifest: Option<ExtensionManifest>) {
        if let Err(e) = self.registry.refresh() {
            warn!(error = %e, "Registry refresh failed after lifecycle change");
        }
        let event = LifecycleEvent {
            kind,
            id: id.to_string(),
            manifest,
            at: Utc::now(),
        };
        // Sending only fails when nobody is subscribed.
        let _ = self.events.send(event);
    }
}

fn discard(dir: &NormalizedPath) {
    if let Err(e) = io::remove_dir_all(dir) {
        error!(path = %dir, error = %e, "Failed to remove partial extension directory");
    }
}
