//! Exclusive ownership of a session directory
//!
//! The lease is a file inside the session directory holding an advisory exclusive lock for as
//! long as the recorder owns the session. The file outliving its lock marks an interrupted
//! session; the lock itself tells recovery whether a live recorder still owns it.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, CaptureResult};
use crate::packaging::LEASE_FILE;

/// Held from start until seal; a lease left behind marks an interrupted session
#[derive(Debug)]
pub struct SessionLease {
    path: PathBuf,
    file: File,
}

impl SessionLease {
    pub fn acquire(session_dir: &Path, session_id: &str) -> CaptureResult<Self> {
        let path = session_dir.join(LEASE_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                let message = if e.kind() == ErrorKind::AlreadyExists {
                    format!("session {} is already leased by another recorder", session_id)
                } else {
                    format!("cannot lease {}: {}", session_dir.display(), e)
                };
                CaptureError::logger_open("session", message)
            })?;
        file.try_lock_exclusive()
            .map_err(|e| CaptureError::logger_open("session", format!("cannot lock lease: {}", e)))?;
        writeln!(file, "pid={} session={}", std::process::id(), session_id)
            .map_err(|e| CaptureError::io_at(&e, &path))?;
        Ok(Self { path, file })
    }

    /// Take over the lease an interrupted recorder left behind
    ///
    /// `None` when there is no lease file or its owner still holds the lock.
    pub fn reclaim(session_dir: &Path) -> CaptureResult<Option<Self>> {
        let path = session_dir.join(LEASE_FILE);
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CaptureError::io_at(&e, &path)),
        };
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { path, file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(CaptureError::io_at(&e, &path)),
        }
    }

    pub fn is_held(session_dir: &Path) -> bool {
        session_dir.join(LEASE_FILE).is_file()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lease file while still locked, then drop the lock
    pub fn release(self) -> CaptureResult<()> {
        let removed = std::fs::remove_file(&self.path).map_err(|e| CaptureError::io_at(&e, &self.path));
        let _ = FileExt::unlock(&self.file);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lease_fails() {
        let dir = TempDir::new().unwrap();
        let lease = SessionLease::acquire(dir.path(), "s").unwrap();
        assert!(SessionLease::is_held(dir.path()));

        let err = SessionLease::acquire(dir.path(), "s").unwrap_err();
        assert!(matches!(err, CaptureError::LoggerOpenFailure { .. }));

        lease.release().unwrap();
        assert!(!SessionLease::is_held(dir.path()));
        SessionLease::acquire(dir.path(), "s").unwrap();
    }

    #[test]
    fn test_reclaim_skips_live_lease() {
        let dir = TempDir::new().unwrap();
        assert!(SessionLease::reclaim(dir.path()).unwrap().is_none());

        let live = SessionLease::acquire(dir.path(), "s").unwrap();
        assert!(SessionLease::reclaim(dir.path()).unwrap().is_none());
        drop(live);

        // The owner went away without releasing: the file stays, the lock is gone
        assert!(SessionLease::is_held(dir.path()));
        let reclaimed = SessionLease::reclaim(dir.path()).unwrap().unwrap();
        assert!(SessionLease::reclaim(dir.path()).unwrap().is_none());
        reclaimed.release().unwrap();
        assert!(!SessionLease::is_held(dir.path()));
    }
}
