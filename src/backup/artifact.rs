// remotebackup/src/backup/artifact.rs
use std::fs::{self, File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::{Builder as TempFileBuilder, NamedTempFile};

use crate::errors::{AppError, Result};

/// A dump being written.
///
/// Output lands in a hidden temporary file next to the final artifact. Only
/// [`PendingArtifact::commit`] gives it the real name; dropping the value on any
/// other path deletes the partial file, so a truncated dump never looks complete.
pub struct PendingArtifact {
    temp: NamedTempFile,
    target: PathBuf,
}

impl PendingArtifact {
    pub fn create(target: PathBuf) -> Result<Self> {
        let dir = target
            .parent()
            .ok_or_else(|| AppError::InvalidInput(format!("artifact path {} has no parent", target.display())))?;
        let temp = TempFileBuilder::new()
            .prefix(".")
            .suffix(".partial")
            .tempfile_in(dir)?;
        Ok(Self { temp, target })
    }

    /// A handle the child process can write its stdout into.
    pub fn sink(&self) -> Result<File> {
        Ok(self.temp.as_file().try_clone()?)
    }

    /// Current location of the partial file.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Flushes and moves the dump to its final name, replacing a previous run's file.
    pub fn commit(self) -> Result<PathBuf> {
        self.temp.as_file().sync_all()?;
        self.temp.persist(&self.target).map_err(|e| AppError::Io(e.error))?;
        Ok(self.target)
    }
}

/// Applies `mode` to `path`. Setting the same mode twice leaves the same result.
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|source| AppError::Permissions {
        path: path.to_path_buf(),
        mode,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entries(dir: &Path) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    #[test]
    fn test_commit_moves_into_place() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("globals.gzip");
        let pending = PendingArtifact::create(target.clone())?;
        pending.sink()?.write_all(b"data")?;
        let path = pending.commit()?;

        assert_eq!(path, target);
        assert_eq!(fs::read(&target)?, b"data");
        assert_eq!(entries(dir.path())?, vec!["globals.gzip"]);
        Ok(())
    }

    #[test]
    fn test_drop_removes_partial_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let pending = PendingArtifact::create(dir.path().join("app.gzip"))?;
            pending.sink()?.write_all(b"half a dump")?;
        }
        assert!(entries(dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_rerun_keeps_previous_artifact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("app.gzip");
        fs::write(&target, b"yesterday")?;
        {
            let pending = PendingArtifact::create(target.clone())?;
            pending.sink()?.write_all(b"trunc")?;
        }
        assert_eq!(fs::read(&target)?, b"yesterday");
        Ok(())
    }

    #[test]
    fn test_set_permissions_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("app.gzip");
        fs::write(&path, b"x")?;

        set_permissions(&path, 0o640)?;
        let first = fs::metadata(&path)?.permissions().mode() & 0o7777;
        set_permissions(&path, 0o640)?;
        let second = fs::metadata(&path)?.permissions().mode() & 0o7777;

        assert_eq!(first, 0o640);
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_set_permissions_missing_file_is_error() {
        let result = set_permissions(Path::new("/nonexistent/app.gzip"), 0o600);
        assert!(matches!(result, Err(AppError::Permissions { .. })));
    }
}
