//! [`ArchiveBuilder`] for in-memory extension zips.

use std::io::{Cursor, Write};

use serde_json::Value;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::env::manifest_json;

/// Builds a zip archive containing an extension.
///
/// By default the archive holds `manifest.json` and `index.js` at its root.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    id: String,
    kind: &'static str,
    enabled: bool,
    schema: Option<Value>,
    wrapper: Option<String>,
    manifest: Option<Option<String>>,
    files: Vec<(String, String)>,
}

impl ArchiveBuilder {
    pub fn plugin(id: &str) -> Self {
        Self::new(id, "plugin")
    }

    pub fn theme(id: &str) -> Self {
        Self::new(id, "theme")
    }

    fn new(id: &str, kind: &'static str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            enabled: false,
            schema: None,
            wrapper: None,
            manifest: None,
            files: vec![("index.js".to_string(), "export default {};\n".to_string())],
        }
    }

    /// Set the `enabled` flag written into the packaged manifest.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn config_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Nest everything under one top-level directory.
    pub fn wrapped(mut self, dir: &str) -> Self {
        self.wrapper = Some(dir.to_string());
        self
    }

    /// Package `content` verbatim as the manifest.
    pub fn raw_manifest(mut self, content: &str) -> Self {
        self.manifest = Some(Some(content.to_string()));
        self
    }

    pub fn without_manifest(mut self) -> Self {
        self.manifest = Some(None);
        self
    }

    /// Add a file. Names are used as given, so escaping paths can be tested.
    pub fn file(mut self, name: &str, content: &str) -> Self {
        self.files.push((name.to_string(), content.to_string()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let manifest = match self.manifest {
            Some(custom) => custom,
            None => Some(manifest_json(
                &self.id,
                self.kind,
                self.enabled,
                self.schema.as_ref(),
            )),
        };

        let mut entries = Vec::new();
        if let Some(manifest) = manifest {
            entries.push(("manifest.json".to_string(), manifest));
        }
        entries.extend(self.files);

        let options = SimpleFileOptions::default();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        if let Some(wrapper) = &self.wrapper {
            writer.add_directory(format!("{wrapper}/"), options).unwrap();
        }
        for (name, content) in entries {
            let name = match &self.wrapper {
                Some(wrapper) => format!("{wrapper}/{name}"),
                None => name,
            };
            writer.start_file(name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
