use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::Result;

/// Private scratch directory for a single pipeline run.
///
/// The directory is removed by [`Workspace::release`] or, failing that, when
/// the value is dropped, so early returns and panics never leak scratch files.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create a fresh, empty directory owned by this workspace.
    pub fn acquire() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("orrery-").tempdir()?;
        debug!(path = %dir.path().display(), "Acquired workspace");
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        // `dir` is only taken by `release`, which consumes `self`.
        self.dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Delete the directory and everything in it.
    pub fn release(mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close()?;
            debug!(path = %path.display(), "Released workspace");
        }
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove workspace");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_empty_directory() {
        let ws = Workspace::acquire().unwrap();
        assert!(ws.path().is_dir());
        assert_eq!(std::fs::read_dir(ws.path()).unwrap().count(), 0);
    }

    #[test]
    fn release_removes_contents() {
        let ws = Workspace::acquire().unwrap();
        let path = ws.path().to_path_buf();
        std::fs::create_dir(path.join("nested")).unwrap();
        std::fs::write(path.join("nested/file.txt"), b"scratch").unwrap();
        ws.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let path = {
            let ws = Workspace::acquire().unwrap();
            std::fs::write(ws.path().join("a.bin"), [1u8, 2, 3]).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn workspaces_are_distinct() {
        let a = Workspace::acquire().unwrap();
        let b = Workspace::acquire().unwrap();
        assert_ne!(a.path(), b.path());
    }
}
