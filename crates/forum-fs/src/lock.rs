//! Advisory sidecar locks for read-modify-write cycles.
//!
//! A lock on `path` is taken on the sidecar file `path.lock`, never on the
//! data file itself, because the data file is replaced by rename on every
//! write and a lock on the old inode would protect nothing.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;
use std::time::Duration;

use crate::io::{self, RobustnessConfig};
use crate::{Error, NormalizedPath, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// A held advisory lock. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    target: NormalizedPath,
    mode: LockMode,
}

impl FileLock {
    /// Acquire an exclusive lock guarding `target`, retrying until
    /// `config.lock_timeout` elapses.
    pub fn exclusive(target: &NormalizedPath, config: RobustnessConfig) -> Result<Self> {
        Self::acquire(target, LockMode::Exclusive, config)
    }

    /// Acquire a shared lock guarding `target`.
    pub fn shared(target: &NormalizedPath, config: RobustnessConfig) -> Result<Self> {
        Self::acquire(target, LockMode::Shared, config)
    }

    /// Replace the guarded file while the exclusive lock is held.
    pub fn replace(&self, content: &[u8], config: RobustnessConfig) -> Result<()> {
        if self.mode != LockMode::Exclusive {
            return Err(Error::LockFailed {
                path: self.target.to_native(),
            });
        }
        io::replace_file(&self.target, content, config)
    }

    fn acquire(target: &NormalizedPath, mode: LockMode, config: RobustnessConfig) -> Result<Self> {
        let lock_path = sidecar_path(target);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| Error::io(&lock_path, e))?;

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(5))
            .with_max_interval(Duration::from_millis(100))
            .with_max_elapsed_time(Some(config.lock_timeout))
            .build();

        backoff::retry(policy, || {
            let attempt = match mode {
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
                LockMode::Shared => FileExt::try_lock_shared(&file),
            };
            attempt.map_err(backoff::Error::transient)
        })
        .map_err(|_| Error::LockFailed {
            path: target.to_native(),
        })?;

        tracing::trace!(path = %target, ?mode, "Acquired file lock");

        Ok(Self {
            file,
            target: target.clone(),
            mode,
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn sidecar_path(target: &NormalizedPath) -> PathBuf {
    PathBuf::from(format!("{}.lock", target.to_native().display()))
}
