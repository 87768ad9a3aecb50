//! Explicit project root, threaded through every component instead of
//! relying on the process working directory.
use crate::error::{BootstrapError, Result};
use std::path::{Path, PathBuf};

/// Files whose presence marks a directory as a project root.
const ROOT_MARKERS: &[&str] = &[
    "stackup.toml",
    "pyproject.toml",
    "docker-compose.yml",
    ".git",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
    path: PathBuf,
}

impl ProjectRoot {
    /// Use `path` as the project root. It must be an existing directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(BootstrapError::Config(format!(
                "Project root {} is not a directory",
                path.display()
            )));
        }
        let path = path.canonicalize()?;
        Ok(Self { path })
    }

    /// Walk up from `start` to the first directory carrying a root marker.
    /// Falls back to `start` itself when no marker is found.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self> {
        let start = start.as_ref().canonicalize()?;
        let found = start
            .ancestors()
            .find(|dir| ROOT_MARKERS.iter().any(|m| dir.join(m).exists()))
            .map(Path::to_path_buf);

        match found {
            Some(dir) => {
                tracing::debug!("[ProjectRoot] Discovered project root at {}", dir.display());
                Ok(Self { path: dir })
            }
            None => {
                tracing::warn!(
                    "[ProjectRoot] No project marker above {}, using it as root",
                    start.display()
                );
                Self::new(start)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    pub fn env_file(&self) -> PathBuf {
        self.join(".env")
    }

    pub fn env_template(&self) -> PathBuf {
        self.join(".env.example")
    }

    pub fn config_file(&self) -> PathBuf {
        self.join("stackup.toml")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.join(".stackup.lock")
    }
}
