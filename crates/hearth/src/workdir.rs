//! The server's temporary working directory.
//!
//! One directory is created per server start, named with a recognizable
//! prefix and containing a `readme.txt` marker so a user who stumbles on a
//! leftover copy knows what it is. Removal is best effort: it happens at
//! clean teardown (or on drop), not under a forced process kill.

use std::io;
use std::path::Path;

use tempfile::TempDir;

/// Contents of the marker file dropped into the working directory.
const README: &str = "This directory is (was) used by an embedded web server application.\n\
It may be safely removed if the application is no longer running.\n";

/// Name of the marker file.
pub const README_FILE: &str = "readme.txt";

/// A process-owned temporary working directory.
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Creates a fresh working directory with the given name prefix and
    /// writes the marker file into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or the marker file cannot be
    /// created.
    pub fn create(prefix: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        std::fs::write(dir.path().join(README_FILE), README)?;
        tracing::debug!(path = %dir.path().display(), "created working directory");
        Ok(Self { dir })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory and everything in it.
    ///
    /// Failures are logged, not returned: teardown has no caller left to
    /// receive them.
    pub fn remove(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove working directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_uses_prefix() {
        let workdir = WorkDir::create("hearth-test-").unwrap();
        let name = workdir
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .to_string();
        assert!(name.starts_with("hearth-test-"), "got {name}");
        workdir.remove();
    }

    #[test]
    fn test_create_writes_marker() {
        let workdir = WorkDir::create("hearth-test-").unwrap();
        let marker = workdir.path().join(README_FILE);
        let contents = std::fs::read_to_string(&marker).unwrap();
        assert!(contents.contains("embedded web server"));
        workdir.remove();
    }

    #[test]
    fn test_remove_deletes_directory() {
        let workdir = WorkDir::create("hearth-test-").unwrap();
        let path = workdir.path().to_path_buf();
        workdir.remove();
        assert!(!path.exists());
    }
}
