//! Filesystem primitives for the forum extension manager
//!
//! Provides normalized paths, durable atomic writes guarded by advisory
//! locks, and a format-agnostic store for small structured files.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod lock;
pub mod path;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use io::RobustnessConfig;
pub use lock::FileLock;
pub use path::NormalizedPath;
