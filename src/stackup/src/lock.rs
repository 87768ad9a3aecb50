//! Advisory lock against two installers running on one project root.
use crate::error::{BootstrapError, Result};
use crate::project::ProjectRoot;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Held for the duration of an installer run; removed on drop.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    /// Publish the lock file with our PID already inside. A lock whose owner
    /// no longer exists is reclaimed; an unreadable one is treated as held.
    pub fn acquire(root: &ProjectRoot) -> Result<Self> {
        let path = root.lock_file();
        match Self::create(root, &path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let Some(owner) = read_owner(&path) else {
                    return Err(BootstrapError::Locked(format!(
                        "{} exists but names no owner; remove it if no other run is active",
                        path.display()
                    )));
                };
                if process_alive(owner) {
                    return Err(BootstrapError::Locked(format!(
                        "{} is held by PID {}; wait for it to finish",
                        path.display(),
                        owner
                    )));
                }
                tracing::warn!(
                    "[ProjectLock] Reclaiming stale lock {} (PID {} is gone)",
                    path.display(),
                    owner
                );
                std::fs::remove_file(&path)?;
                Self::create(root, &path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::AlreadyExists {
                        BootstrapError::Locked(format!(
                            "{} was taken by another run",
                            path.display()
                        ))
                    } else {
                        BootstrapError::Io(e)
                    }
                })
            }
            Err(e) => Err(BootstrapError::Io(e)),
        }
    }

    fn create(root: &ProjectRoot, path: &Path) -> std::io::Result<Self> {
        let mut tmp = tempfile::NamedTempFile::new_in(root.path())?;
        writeln!(tmp, "{}", std::process::id())?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(path).map_err(|e| e.error)?;
        tracing::debug!("[ProjectLock] Acquired {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                "[ProjectLock] Failed to remove {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    Path::new(&format!("/proc/{}", pid)).exists()
}
