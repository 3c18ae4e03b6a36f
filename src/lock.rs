//! Exclusive ownership of a data directory by one resident process.
//!
//! Only the process holding the lock arms timers, so every unfired task has
//! at most one live timer across all running `remindr` processes.
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use log::{debug, warn};

use crate::{RemindError, Result};

/// Advisory lock released when dropped.
#[derive(Debug)]
pub struct DaemonLock {
    file: File,
    path: PathBuf,
}

impl DaemonLock {
    /// Takes the lock without waiting.
    ///
    /// Returns `Ok(None)` if another process already holds it.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| RemindError::DirectoryError {
                path: parent.to_path_buf(),
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                file.set_len(0)?;
                writeln!(file, "{}", std::process::id())?;
                debug!("Acquired daemon lock {}", path.display());
                Ok(Some(Self {
                    file,
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(RemindError::Io(e)),
        }
    }

    /// Takes the lock or fails with [`RemindError::AlreadyRunning`].
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::try_acquire(path)?.ok_or_else(|| RemindError::AlreadyRunning {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release daemon lock {}: {}", self.path.display(), e);
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
