//! Server configuration file
//!
//! Every field has a default, so a missing file or a missing section is not
//! an error. Paths are resolved against the directory holding the file.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use forum_extensions::LifecycleOptions;
use forum_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "forum.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub extensions: ExtensionsSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: SocketAddr,
    /// Bearer token required on admin routes. `None` disables auth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
    pub max_upload_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5080)),
            admin_token: None,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsSection {
    pub root: PathBuf,
    pub configs_dir: PathBuf,
    /// Ids that cannot be uninstalled.
    pub protected: BTreeSet<String>,
    pub remove_config_on_uninstall: bool,
    /// Extension id to directory name, for legacy directory layouts.
    pub aliases: BTreeMap<String, String>,
}

impl Default for ExtensionsSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("extensions"),
            configs_dir: PathBuf::from("ExtensionConfigs"),
            protected: BTreeSet::new(),
            remove_config_on_uninstall: false,
            aliases: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    ///
    /// The format follows the file extension (`.toml`, `.json`, `.yaml`).
    pub fn load(path: &Path) -> Result<Self> {
        let file = NormalizedPath::new(path);
        let mut config: Self = ConfigStore::new().load_optional(&file)?.unwrap_or_default();
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    /// Make relative extension paths absolute under `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.extensions.root, &mut self.extensions.configs_dir] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            protected: self.extensions.protected.clone(),
            remove_config_on_uninstall: self.extensions.remove_config_on_uninstall,
            ..LifecycleOptions::default()
        }
    }

    /// `tracing_subscriber::EnvFilter` directives for the configured level.
    pub fn log_filter(&self, verbose: bool) -> String {
        let level = if verbose { "debug" } else { self.logging.level.as_str() };
        format!("forum_server={level},forum_extensions={level},forum_fs={level}")
    }
}
