//! Shared test utilities for the forum extension workspace.
//!
//! Dev-dependency only, never published. Fixtures work on raw JSON and zip
//! bytes so this crate does not depend on the crates it helps test.
//!
//! # Modules
//!
//! - [`env`] - [`TestExtensions`], a temporary extensions root
//! - [`archive`] - [`ArchiveBuilder`] for in-memory extension zips

pub mod archive;
pub mod env;

pub use archive::ArchiveBuilder;
pub use env::{TestExtensions, manifest_json};
