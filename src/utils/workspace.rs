//! Owned scratch directories.
//!
//! The orchestrator creates one workspace per run and passes paths down;
//! collaborators only ever write inside it. Dropped workspaces remove
//! themselves unless `keep()` was called.

use std::path::{Path, PathBuf};

use crate::Result;

#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    keep: bool,
}

impl Workspace {
    /// Create a fresh workspace at `dir`, wiping any leftover content.
    pub fn create(dir: PathBuf) -> Result<Self> {
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Retain the directory past drop.
    pub fn keep(&mut self) {
        self.keep = true;
    }

    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_itself_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("work");
        {
            let ws = Workspace::create(dir.clone()).unwrap();
            std::fs::write(ws.path().join("x"), "y").unwrap();
        }
        assert!(!dir.exists());
    }

    #[test]
    fn kept_workspace_survives_drop() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("work");
        {
            let mut ws = Workspace::create(dir.clone()).unwrap();
            ws.keep();
        }
        assert!(dir.exists());
    }

    #[test]
    fn create_wipes_leftovers() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("work");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale"), "old").unwrap();
        let ws = Workspace::create(dir.clone()).unwrap();
        assert!(!ws.path().join("stale").exists());
    }
}
