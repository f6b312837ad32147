//! Single-writer advisory lock.
//!
//! The entity store and the event log share one write-serialization
//! domain: all mutation paths (recording, replay, sync upsert) must run
//! under this exclusive lock so concurrent writers cannot interleave on
//! `revision`/`sync_state`. Readers do not lock — SQLite WAL gives them
//! snapshot isolation.

use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Lock file name, placed next to the store database.
pub const LOCK_FILE_NAME: &str = "stacks.lock";

/// Default time to wait for the writer lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Advisory lock errors.
#[derive(Debug)]
pub enum LockError {
    Timeout { path: PathBuf, waited: Duration },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::EventAppendFailed,
        }
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "{}: writer lock timed out after {:?} at {}",
                    self.code().code(),
                    waited,
                    path.display()
                )
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for LockError {}

/// Exclusive writer lock over a store directory. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the writer lock for `store_dir`, retrying until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when another writer holds the lock
    /// past the deadline, or [`LockError::IoError`] for filesystem
    /// failures.
    pub fn acquire(store_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = store_dir.join(LOCK_FILE_NAME);
        fs::create_dir_all(store_dir)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { file, path });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path,
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Acquire with the default timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Self::acquire`].
    pub fn acquire_default(store_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(store_dir, DEFAULT_LOCK_TIMEOUT)
    }

    /// Path of the underlying lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(error) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %error, "failed to release store lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, StoreLock};
    use std::time::Duration;

    #[test]
    fn second_writer_times_out_while_first_holds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = StoreLock::acquire(dir.path(), Duration::from_millis(100)).expect("first");

        let second = StoreLock::acquire(dir.path(), Duration::from_millis(50));
        match second {
            Err(LockError::Timeout { .. }) => {}
            other => panic!("expected timeout, got {other:?}"),
        }

        drop(first);
        StoreLock::acquire(dir.path(), Duration::from_millis(100))
            .expect("lock reacquired after release");
    }

    #[test]
    fn lock_file_lands_in_store_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = StoreLock::acquire_default(dir.path()).expect("acquire");
        assert!(lock.path().starts_with(dir.path()));
        assert!(lock.path().exists());
    }
}
