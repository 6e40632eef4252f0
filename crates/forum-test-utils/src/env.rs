//! [`TestExtensions`] fixture for extension-root scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

/// Render a manifest for `id`.
pub fn manifest_json(id: &str, kind: &str, enabled: bool, schema: Option<&Value>) -> String {
    let mut manifest = json!({
        "id": id,
        "name": title_case(id),
        "version": "1.0.0",
        "author": "Forum Test Suite",
        "description": format!("Test {kind} {id}"),
        "type": kind,
        "enabled": enabled,
    });
    if let Some(schema) = schema {
        manifest["configSchema"] = schema.clone();
    }
    serde_json::to_string_pretty(&manifest).unwrap()
}

fn title_case(id: &str) -> String {
    id.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A temporary directory holding an `extensions/` root and a sibling
/// `ExtensionConfigs/` directory.
///
/// # Example
///
/// ```rust,no_run
/// use forum_test_utils::TestExtensions;
///
/// let env = TestExtensions::new();
/// env.write_plugin("cookie-consent", false);
/// env.assert_file_exists("extensions/cookie-consent/manifest.json");
/// ```
pub struct TestExtensions {
    temp_dir: TempDir,
}

impl Default for TestExtensions {
    fn default() -> Self {
        Self::new()
    }
}

impl TestExtensions {
    /// Create the temporary directory with an empty extensions root.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("extensions")).unwrap();
        Self { temp_dir }
    }

    /// The temporary directory itself.
    pub fn base(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The extensions root.
    pub fn root(&self) -> PathBuf {
        self.base().join("extensions")
    }

    /// Where per-extension config files go. Not created up front.
    pub fn configs_dir(&self) -> PathBuf {
        self.base().join("ExtensionConfigs")
    }

    /// Write `content` as `extensions/<dir>/manifest.json`.
    pub fn write_manifest(&self, dir: &str, content: &str) -> PathBuf {
        let ext_dir = self.root().join(dir);
        fs::create_dir_all(&ext_dir).unwrap();
        fs::write(ext_dir.join("manifest.json"), content).unwrap();
        ext_dir
    }

    pub fn write_plugin(&self, id: &str, enabled: bool) -> PathBuf {
        self.write_manifest(id, &manifest_json(id, "plugin", enabled, None))
    }

    pub fn write_theme(&self, id: &str, enabled: bool) -> PathBuf {
        self.write_manifest(id, &manifest_json(id, "theme", enabled, None))
    }

    /// Write a disabled plugin declaring `schema` as its `configSchema`.
    pub fn write_plugin_with_schema(&self, id: &str, schema: Value) -> PathBuf {
        self.write_manifest(id, &manifest_json(id, "plugin", false, Some(&schema)))
    }

    /// Build a standalone extension directory outside the root, as a
    /// developer would have before installing it.
    pub fn scratch_extension(&self, id: &str) -> PathBuf {
        let dir = self.base().join("scratch").join(id);
        fs::create_dir_all(dir.join("assets")).unwrap();
        fs::write(dir.join("manifest.json"), manifest_json(id, "plugin", true, None)).unwrap();
        fs::write(dir.join("index.js"), "export default {};\n").unwrap();
        fs::write(dir.join("assets/style.css"), "body {}\n").unwrap();
        dir
    }

    /// Sorted names of everything directly under the extensions root.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Parse a JSON file relative to the base directory.
    pub fn read_json(&self, path: &str) -> Value {
        let full_path = self.base().join(path);
        let content = fs::read_to_string(&full_path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", full_path.display()));
        serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Invalid JSON in {}: {e}", full_path.display()))
    }

    /// Assert that `path` (relative to the base directory) exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, path: &str) {
        let full_path = self.base().join(path);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }

    /// Assert that `path` (relative to the base directory) does not exist.
    pub fn assert_file_not_exists(&self, path: &str) {
        let full_path = self.base().join(path);
        assert!(
            !full_path.exists(),
            "Expected file NOT to exist: {}",
            full_path.display()
        );
    }
}
