//! Plugin and theme lifecycle management for the forum.
//!
//! Extensions live in a root directory, one subdirectory per extension id,
//! each holding a `manifest.json`. A root `extensions.json` index mirrors the
//! installed set. The [`LifecycleManager`] is the only component that
//! mutates either; the [`ExtensionRegistry`] reads them back as a unified
//! list, and the [`ExtensionConfigStore`] keeps per-extension settings.
//! [`IntegrationRegistry`] mirrors enabled extensions into UI slots and hooks.

pub mod archive;
pub mod config;
pub mod error;
pub mod index;
pub mod integration;
pub mod lifecycle;
pub mod manifest;
pub mod registry;
pub mod schema;
pub mod store;

/// Filename of the per-extension manifest.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Filename of the root index.
pub const INDEX_FILENAME: &str = "extensions.json";

pub use config::{ExtensionConfigRecord, ExtensionConfigStore};
pub use error::{Error, ErrorKind, Result};
pub use index::{ExtensionIndex, IndexEntry};
pub use integration::{
    ExtensionModule, Integration, IntegrationRegistry, LoadedModule, RegistrySnapshot,
    SlotContribution,
};
pub use lifecycle::{LifecycleEvent, LifecycleEventKind, LifecycleManager, LifecycleOptions};
pub use manifest::{Capabilities, ExtensionManifest, ExtensionType};
pub use registry::{ExtensionRegistry, ExtensionStats, ExtensionStatus, RegistryEntry};
pub use schema::{ConfigSchema, FieldError, PropertySchema, PropertyType, ValidationReport};
pub use store::ManifestStore;
