//! Inspection and extraction of uploaded extension archives.
//!
//! An archive is a zip whose root holds `manifest.json`. Archives produced
//! by "download as zip" tools usually wrap everything in one top-level
//! folder; that single wrapping directory is stripped on extraction.

use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::MANIFEST_FILENAME;
use crate::error::{Error, Result};
use crate::manifest::ExtensionManifest;

/// Upper bound on the size of `manifest.json` inside an archive.
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// The manifest found in an archive and where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveManifest {
    pub manifest: ExtensionManifest,
    /// Top-level directory wrapping the archive contents, if any.
    pub prefix: Option<String>,
}

fn open(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::InvalidArchive(format!("not a readable zip archive: {e}")))
}

/// Locate and validate the manifest without extracting anything.
pub fn inspect(bytes: &[u8]) -> Result<ArchiveManifest> {
    let mut archive = open(bytes)?;

    let prefix = if archive.index_for_name(MANIFEST_FILENAME).is_some() {
        None
    } else {
        let top = single_top_level(&archive).ok_or_else(|| {
            Error::InvalidArchive(format!("archive has no {MANIFEST_FILENAME} at its root"))
        })?;
        if archive
            .index_for_name(&format!("{top}/{MANIFEST_FILENAME}"))
            .is_none()
        {
            return Err(Error::InvalidArchive(format!(
                "archive has no {MANIFEST_FILENAME} at its root"
            )));
        }
        Some(top)
    };

    let manifest_name = match &prefix {
        Some(top) => format!("{top}/{MANIFEST_FILENAME}"),
        None => MANIFEST_FILENAME.to_string(),
    };
    let entry = archive.by_name(&manifest_name)?;
    let mut content = String::new();
    entry
        .take(MAX_MANIFEST_BYTES)
        .read_to_string(&mut content)
        .map_err(|e| Error::InvalidArchive(format!("unreadable {manifest_name}: {e}")))?;

    let manifest = ExtensionManifest::from_json(&content)?;
    Ok(ArchiveManifest { manifest, prefix })
}

/// The one directory every entry lives under, if there is exactly one.
fn single_top_level(archive: &ZipArchive<Cursor<&[u8]>>) -> Option<String> {
    let mut top: Option<&str> = None;
    for name in archive.file_names() {
        let (first, _) = name.split_once('/')?;
        if first.is_empty() {
            return None;
        }
        match top {
            Some(seen) if seen != first => return None,
            Some(_) => {}
            None => top = Some(first),
        }
    }
    top.map(str::to_string)
}

/// Extract every entry below `prefix` into `dest`. Returns the file count.
///
/// Entries whose names would land outside `dest` fail the whole extraction
/// with [`Error::InvalidArchive`].
pub fn extract(bytes: &[u8], prefix: Option<&str>, dest: &Path) -> Result<usize> {
    let mut archive = open(bytes)?;
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(Error::InvalidArchive(format!(
                "entry '{}' escapes the extension directory",
                entry.name()
            )));
        };
        let relative: PathBuf = match prefix {
            Some(top) => match enclosed.strip_prefix(top) {
                Ok(rest) => rest.to_path_buf(),
                Err(_) => continue,
            },
            None => enclosed,
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let out = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| Error::io(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut file = File::create(&out).map_err(|e| Error::io(&out, e))?;
        std::io::copy(&mut entry, &mut file).map_err(|e| Error::io(&out, e))?;
        files += 1;
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    const MANIFEST: &str =
        r#"{"id":"cookie-consent","name":"Cookie Consent","version":"1.0.0","type":"plugin"}"#;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_inspect_root_manifest() {
        let bytes = zip_of(&[("manifest.json", MANIFEST), ("index.js", "export {}")]);
        let found = inspect(&bytes).unwrap();

        assert_eq!(found.manifest.id, "cookie-consent");
        assert_eq!(found.prefix, None);
    }

    #[test]
    fn test_inspect_wrapped_manifest() {
        let bytes = zip_of(&[
            ("cookie-consent-main/", ""),
            ("cookie-consent-main/manifest.json", MANIFEST),
            ("cookie-consent-main/dist/index.js", "export {}"),
        ]);
        let found = inspect(&bytes).unwrap();

        assert_eq!(found.prefix.as_deref(), Some("cookie-consent-main"));
    }

    #[test]
    fn test_inspect_rejects_missing_manifest() {
        let bytes = zip_of(&[("README.md", "hello")]);
        assert!(matches!(inspect(&bytes), Err(Error::InvalidArchive(_))));

        let nested = zip_of(&[("a/manifest.json", MANIFEST), ("b/other.txt", "x")]);
        assert!(matches!(inspect(&nested), Err(Error::InvalidArchive(_))));
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(matches!(
            inspect(b"definitely not a zip"),
            Err(Error::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_inspect_rejects_invalid_manifest() {
        let bytes = zip_of(&[("manifest.json", r#"{"id":"x"}"#)]);
        assert!(matches!(inspect(&bytes), Err(Error::InvalidManifest { .. })));
    }

    #[test]
    fn test_extract_strips_prefix() {
        let temp = tempdir().unwrap();
        let bytes = zip_of(&[
            ("pkg/manifest.json", MANIFEST),
            ("pkg/dist/", ""),
            ("pkg/dist/index.js", "export {}"),
        ]);

        let count = extract(&bytes, Some("pkg"), temp.path()).unwrap();

        assert_eq!(count, 2);
        assert!(temp.path().join("manifest.json").is_file());
        assert_eq!(
            fs::read_to_string(temp.path().join("dist/index.js")).unwrap(),
            "export {}"
        );
    }

    #[test]
    fn test_extract_rejects_escaping_entries() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("dest");
        let bytes = zip_of(&[("manifest.json", MANIFEST), ("../evil.txt", "boom")]);

        let err = extract(&bytes, None, &dest).unwrap_err();

        assert!(matches!(err, Error::InvalidArchive(_)));
        assert!(!temp.path().join("evil.txt").exists());
    }
}
