//! Extension manifest parsing for `manifest.json` files.
//!
//! Every extension directory carries a manifest that declares its identity,
//! kind, capabilities, and optional configuration schema. The manifest's
//! `enabled` flag is the authoritative on/off state.
//!
//! # Example
//!
//! ```json
//! {
//!   "id": "cookie-consent",
//!   "name": "Cookie Consent",
//!   "version": "1.2.0",
//!   "author": "Forum Team",
//!   "description": "Shows a GDPR cookie banner",
//!   "type": "plugin",
//!   "enabled": false,
//!   "capabilities": { "slots": ["footer"], "hooks": ["page:load"] },
//!   "configSchema": {
//!     "groups": [{
//!       "key": "banner",
//!       "title": "Banner",
//!       "properties": {
//!         "showBanner": { "type": "boolean", "default": true }
//!       }
//!     }]
//!   }
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::ConfigSchema;

/// Whether an extension adds behavior or changes appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionType {
    Plugin,
    Theme,
}

impl fmt::Display for ExtensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin => write!(f, "plugin"),
            Self::Theme => write!(f, "theme"),
        }
    }
}

/// UI slots and hooks an extension contributes to once enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Capabilities {
    #[serde(default)]
    pub slots: BTreeSet<String>,
    #[serde(default)]
    pub hooks: BTreeSet<String>,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.hooks.is_empty()
    }
}

/// Complete extension manifest loaded from `manifest.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionManifest {
    /// Unique identifier; also the directory name unless aliased.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Semver version string.
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub extension_type: ExtensionType,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Capabilities::is_empty")]
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<ConfigSchema>,
}

impl ExtensionManifest {
    /// Parse and validate a manifest from JSON.
    ///
    /// Malformed JSON is reported as [`Error::InvalidManifest`], since this
    /// entry point is used for content that has not been installed yet.
    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content).map_err(|e| Error::InvalidManifest {
            reason: e.to_string(),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize to pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self).map_err(|e| Error::InvalidManifest {
            reason: e.to_string(),
        })?;
        out.push('\n');
        Ok(out)
    }

    pub fn is_theme(&self) -> bool {
        self.extension_type == ExtensionType::Theme
    }

    /// Validate the manifest fields.
    pub fn validate(&self) -> Result<()> {
        validate_extension_id(&self.id)?;

        if self.name.trim().is_empty() {
            return Err(Error::InvalidManifest {
                reason: format!("extension '{}' has an empty name", self.id),
            });
        }

        semver::Version::parse(&self.version).map_err(|e| Error::InvalidManifest {
            reason: format!(
                "extension '{}' has invalid version '{}': {e}",
                self.id, self.version
            ),
        })?;

        if let Some(schema) = &self.config_schema {
            schema.check().map_err(|reason| Error::InvalidManifest {
                reason: format!("extension '{}' has an invalid config schema: {reason}", self.id),
            })?;
        }

        Ok(())
    }
}

/// Check that `id` is usable as a directory and file name.
///
/// Ids are restricted to ASCII alphanumerics, hyphens, and underscores.
pub fn validate_extension_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidManifest {
            reason: "extension id must not be empty".to_string(),
        });
    }
    if !is_valid_id(id) {
        return Err(Error::InvalidManifest {
            reason: format!(
                "extension id '{id}' must contain only alphanumeric characters, hyphens, or underscores"
            ),
        });
    }
    Ok(())
}

pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
