//! Durable reads and writes of manifests and the root index.

use std::collections::BTreeMap;

use forum_fs::config::Format;
use forum_fs::{ConfigStore, FileLock, NormalizedPath, RobustnessConfig, io};
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::{ExtensionIndex, IndexEntry, IndexFile};
use crate::manifest::{ExtensionManifest, is_valid_id};
use crate::{INDEX_FILENAME, MANIFEST_FILENAME};

/// Reads and writes `manifest.json` files and `extensions.json` under an
/// extensions root.
///
/// Every write is a full-file atomic replace. Index mutations run under the
/// index's exclusive [`FileLock`] and bump its revision.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: NormalizedPath,
    aliases: BTreeMap<String, String>,
    files: ConfigStore,
}

impl ManifestStore {
    pub fn new(root: impl Into<NormalizedPath>) -> Self {
        Self {
            root: root.into(),
            aliases: BTreeMap::new(),
            files: ConfigStore::new(),
        }
    }

    /// Map extension ids to legacy directory names.
    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.files = ConfigStore::with_robustness(robustness);
        self
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    pub fn robustness(&self) -> RobustnessConfig {
        self.files.robustness()
    }

    pub fn index_path(&self) -> NormalizedPath {
        self.root.join(INDEX_FILENAME)
    }

    /// Directory name for `id`: its alias if one is configured, else the id.
    pub fn directory_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Path of the directory that holds (or would hold) extension `id`.
    ///
    /// Ids that could escape the root are reported as unknown.
    pub fn extension_dir(&self, id: &str) -> Result<NormalizedPath> {
        let dir_name = self.directory_name(id);
        if !is_valid_id(id) || !is_safe_dir_name(dir_name) {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(self.root.join(dir_name))
    }

    pub fn manifest_path(&self, id: &str) -> Result<NormalizedPath> {
        Ok(self.extension_dir(id)?.join(MANIFEST_FILENAME))
    }

    /// Read and validate the manifest of an installed extension.
    pub fn read_manifest(&self, id: &str) -> Result<ExtensionManifest> {
        let path = self.manifest_path(id)?;
        if !path.is_file() {
            return Err(Error::NotFound(id.to_string()));
        }
        let manifest: ExtensionManifest = self.files.load(&path)?;
        manifest.validate()?;
        if manifest.id != id {
            return Err(Error::InvalidManifest {
                reason: format!("{path} declares id '{}', expected '{id}'", manifest.id),
            });
        }
        debug!(extension_id = %id, "Read manifest");
        Ok(manifest)
    }

    /// Read and validate the manifest inside an arbitrary directory.
    pub fn read_manifest_at(&self, dir: &NormalizedPath) -> Result<ExtensionManifest> {
        let manifest: ExtensionManifest = self.files.load(&dir.join(MANIFEST_FILENAME))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Overwrite the whole manifest of an installed extension.
    ///
    /// Never creates the extension directory: writing to an unknown id fails
    /// with [`Error::NotFound`] and leaves the filesystem untouched.
    pub fn write_manifest(&self, id: &str, manifest: &ExtensionManifest) -> Result<()> {
        if manifest.id != id {
            return Err(Error::InvalidManifest {
                reason: format!("manifest id '{}' does not match '{id}'", manifest.id),
            });
        }
        let dir = self.extension_dir(id)?;
        if !dir.is_dir() {
            return Err(Error::NotFound(id.to_string()));
        }
        self.files.save(&dir.join(MANIFEST_FILENAME), manifest)?;
        debug!(extension_id = %id, enabled = manifest.enabled, "Wrote manifest");
        Ok(())
    }

    /// Read the index; a missing file is an empty index at revision 0.
    pub fn read_index(&self) -> Result<ExtensionIndex> {
        let path = self.index_path();
        match io::read_optional(&path)? {
            Some(content) => {
                let file: IndexFile = ConfigStore::parse(&path, Format::Json, &content)?;
                Ok(file.into())
            }
            None => Ok(ExtensionIndex::default()),
        }
    }

    /// Rewrite the whole index. Returns the new revision.
    pub fn write_index(&self, entries: Vec<IndexEntry>) -> Result<u64> {
        self.locked_index(|index| {
            index.extensions = entries;
            Ok(())
        })
        .map(|(revision, ())| revision)
    }

    /// Rewrite the index only if it is still at `expected_revision`.
    pub fn write_index_if(&self, expected_revision: u64, entries: Vec<IndexEntry>) -> Result<u64> {
        self.locked_index(|index| {
            if index.revision != expected_revision {
                return Err(Error::StaleIndex {
                    expected: expected_revision,
                    actual: index.revision,
                });
            }
            index.extensions = entries;
            Ok(())
        })
        .map(|(revision, ())| revision)
    }

    /// Read-modify-write the index under its exclusive lock.
    ///
    /// If `f` fails nothing is written.
    pub fn update_index<T>(&self, f: impl FnOnce(&mut ExtensionIndex) -> Result<T>) -> Result<T> {
        self.locked_index(f).map(|(_, value)| value)
    }

    fn locked_index<T>(
        &self,
        f: impl FnOnce(&mut ExtensionIndex) -> Result<T>,
    ) -> Result<(u64, T)> {
        let path = self.index_path();
        let robustness = self.files.robustness();
        let lock = FileLock::exclusive(&path, robustness)?;

        let mut index = self.read_index()?;
        let value = f(&mut index)?;
        index.revision += 1;

        let content = ConfigStore::render(&path, &index)?;
        lock.replace(content.as_bytes(), robustness)?;
        debug!(revision = index.revision, entries = index.extensions.len(), "Wrote extension index");
        Ok((index.revision, value))
    }

    /// Remove an extension's directory. Returns whether it existed.
    pub fn remove_extension_dir(&self, id: &str) -> Result<bool> {
        let dir = self.extension_dir(id)?;
        Ok(io::remove_dir_all(&dir)?)
    }
}

fn is_safe_dir_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn manifest(id: &str) -> ExtensionManifest {
        ExtensionManifest::from_json(&format!(
            r#"{{"id":"{id}","name":"{id}","version":"1.0.0","type":"plugin"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_manifest_round_trip() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());
        std::fs::create_dir(temp.path().join("alpha")).unwrap();

        let mut m = manifest("alpha");
        m.enabled = true;
        store.write_manifest("alpha", &m).unwrap();

        assert_eq!(store.read_manifest("alpha").unwrap(), m);
    }

    #[test]
    fn test_missing_manifest_is_not_found() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());

        assert!(matches!(store.read_manifest("ghost"), Err(Error::NotFound(id)) if id == "ghost"));
    }

    #[test]
    fn test_write_to_unknown_id_creates_nothing() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());

        let err = store.write_manifest("ghost", &manifest("ghost")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_corrupt_manifest_is_parse_error() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());
        std::fs::create_dir(temp.path().join("broken")).unwrap();
        std::fs::write(temp.path().join("broken/manifest.json"), "{ not json").unwrap();

        let err = store.read_manifest("broken").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Parse);
    }

    #[test]
    fn test_alias_resolves_legacy_directory() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path()).with_aliases(BTreeMap::from([(
            "cookie-consent".to_string(),
            "CookieConsent".to_string(),
        )]));
        std::fs::create_dir(temp.path().join("CookieConsent")).unwrap();
        store
            .write_manifest("cookie-consent", &manifest("cookie-consent"))
            .unwrap();

        assert!(temp.path().join("CookieConsent/manifest.json").is_file());
        assert_eq!(store.read_manifest("cookie-consent").unwrap().id, "cookie-consent");
    }

    #[test]
    fn test_relative_root_outside_working_directory() {
        let store = ManifestStore::new("../site/extensions");

        assert_eq!(store.root().as_str(), "../site/extensions");
        assert_eq!(store.index_path().as_str(), "../site/extensions/extensions.json");
        assert_eq!(
            store.manifest_path("cookie-consent").unwrap().as_str(),
            "../site/extensions/cookie-consent/manifest.json"
        );
    }

    #[test]
    fn test_escaping_ids_rejected() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());

        for id in ["..", "../etc", "a/b", ""] {
            assert!(matches!(store.extension_dir(id), Err(Error::NotFound(_))), "{id}");
        }
    }

    #[test]
    fn test_index_missing_is_empty() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());

        assert_eq!(store.read_index().unwrap(), ExtensionIndex::default());
    }

    #[test]
    fn test_index_writes_bump_revision() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());

        let r1 = store
            .write_index(vec![IndexEntry::from_manifest(&manifest("a"))])
            .unwrap();
        store
            .update_index(|index| {
                index.record(&manifest("b"));
                Ok(())
            })
            .unwrap();

        assert_eq!(r1, 1);
        let index = store.read_index().unwrap();
        assert_eq!(index.revision, 2);
        assert!(index.contains("a"));
        assert!(index.contains("b"));
    }

    #[test]
    fn test_conditional_write_detects_stale_revision() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());
        store.write_index(Vec::new()).unwrap();

        let seen = store.read_index().unwrap().revision;
        store.write_index(Vec::new()).unwrap();

        let err = store.write_index_if(seen, Vec::new()).unwrap_err();
        assert!(matches!(err, Error::StaleIndex { expected: 1, actual: 2 }));
        assert_eq!(store.write_index_if(2, Vec::new()).unwrap(), 3);
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());

        let result: Result<()> =
            store.update_index(|_| Err(Error::NotFound("x".to_string())));
        assert!(result.is_err());
        assert!(!store.index_path().exists());
    }

    #[test]
    fn test_legacy_index_file_read() {
        let temp = tempdir().unwrap();
        let store = ManifestStore::new(temp.path());
        std::fs::write(
            temp.path().join(INDEX_FILENAME),
            r#"[{"id":"a","name":"A","type":"plugin","version":"1.0.0","enabled":false}]"#,
        )
        .unwrap();

        let index = store.read_index().unwrap();
        assert_eq!(index.revision, 0);
        assert!(index.contains("a"));
    }
}
