//! File-based locking to serialize writers of shared state files.
//!
//! Uses flock-style advisory locking on a companion `.lock` file so that
//! concurrent invocations never interleave a read-modify-write cycle.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{BipError, Result};

/// A guard that holds an exclusive lock on a lock file.
/// The lock is automatically released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Block until an exclusive lock on `lock_path` is held.
    ///
    /// Opens with create+read+write (no truncate) so creation and locking
    /// do not race with another writer doing the same.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BipError::file(format!("Failed to create {:?}", parent), e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(lock_path)
            .map_err(|e| BipError::file(format!("Failed to open lock file {:?}", lock_path), e))?;

        file.lock_exclusive()
            .map_err(|e| BipError::file(format!("Failed to lock {:?}", lock_path), e))?;

        Ok(Self { _file: file })
    }
}

/// Companion lock path for a data file: `<file>.lock`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_for() {
        assert_eq!(
            lock_path_for(Path::new("/etc/bip/blacklist")),
            PathBuf::from("/etc/bip/blacklist.lock")
        );
    }

    #[test]
    fn test_lock_acquire_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");
        {
            let _guard = LockGuard::acquire(&path).unwrap();
            assert!(path.exists());
        }
        // Released on drop, so a second acquisition succeeds
        let _guard = LockGuard::acquire(&path).unwrap();
    }

    #[test]
    fn test_lock_serializes_threads() {
        let dir = TempDir::new().unwrap();
        let path = Arc::new(dir.path().join("state.lock"));
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = Arc::clone(&path);
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = LockGuard::acquire(&path).unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_lock_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/state.lock");
        let _guard = LockGuard::acquire(&path).unwrap();
        assert!(path.exists());
    }
}
