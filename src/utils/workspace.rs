//! Scratch directories for one run

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::PerShotResult;

/// Temporary run directory with one private subdirectory per shot.
/// Everything is removed when the workspace is dropped.
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    /// Create under `root`, or under the system temp dir
    pub fn create(root: Option<&Path>) -> PerShotResult<Self> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("pershot-");
            builder
        };
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!("Created run workspace at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a shot's private directory (not created)
    pub fn shot_dir_path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("shot_{:04}", index))
    }

    /// Create (or empty) the private directory of a shot
    pub fn fresh_shot_dir(&self, index: usize) -> PerShotResult<PathBuf> {
        let path = self.shot_dir_path(index);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Delete a shot's private directory; missing is fine
    pub fn discard_shot_dir(&self, index: usize) {
        let path = self.shot_dir_path(index);
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    /// Run-level scratch directory for assembly and evaluation files
    pub fn run_dir(&self, name: &str) -> PerShotResult<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shot_dirs_are_private_and_cleaned() {
        let root = tempfile::tempdir().unwrap();
        let workspace_path;
        {
            let workspace = RunWorkspace::create(Some(root.path())).unwrap();
            workspace_path = workspace.path().to_path_buf();

            let a = workspace.fresh_shot_dir(0).unwrap();
            let b = workspace.fresh_shot_dir(12).unwrap();
            assert_ne!(a, b);
            assert!(b.ends_with("shot_0012"));

            std::fs::write(a.join("clip.mkv"), b"x").unwrap();
            let again = workspace.fresh_shot_dir(0).unwrap();
            assert!(!again.join("clip.mkv").exists());

            workspace.discard_shot_dir(12);
            assert!(!b.exists());
            workspace.discard_shot_dir(99);
        }
        assert!(!workspace_path.exists());
    }
}
