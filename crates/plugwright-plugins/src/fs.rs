//! Filesystem seam used by the gateway and the ledger.
//!
//! Everything the manager does to disk goes through [`PluginFs`], so tests
//! can swap in an in-memory implementation.

use std::fmt;
use std::io::Write;
use std::path::Path;

/// The filesystem operations the plugin manager needs.
///
/// All methods are synchronous: they touch local disk only.
pub trait PluginFs: Send + Sync + fmt::Debug {
    /// Whether a regular file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Rename `from` to `to`. Fails if `from` is missing or `to` exists.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Delete the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, including `NotFound`.
    fn remove_file(&self, path: &Path) -> std::io::Result<()>;

    /// File names (not paths) of the regular files directly inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, including `NotFound`.
    fn list_dir(&self, dir: &Path) -> std::io::Result<Vec<String>>;

    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, including `NotFound`.
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    /// Replace the file at `path` with `contents` in one step, creating
    /// parent directories as needed. Readers see either the old or the new
    /// contents, never a partial write.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> std::io::Result<()>;
}

/// [`PluginFs`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl PluginFs for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        // std::fs::rename silently replaces an existing target on Unix.
        if to.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("rename target already exists: {}", to.display()),
            ));
        }
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }

    fn list_dir(&self, dir: &Path) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        // Same directory keeps the final rename on one filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("version.json");

        LocalFs.write_atomic(&path, b"{}").unwrap();
        assert_eq!(LocalFs.read(&path).unwrap(), b"{}");

        LocalFs.write_atomic(&path, b"{\"a\": 1}").unwrap();
        assert_eq!(LocalFs.read(&path).unwrap(), b"{\"a\": 1}");
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let err = LocalFs.rename(&a, &b).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "b");
    }

    #[test]
    fn list_dir_skips_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("foo.py"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub.py")).unwrap();

        let names = LocalFs.list_dir(dir.path()).unwrap();
        assert_eq!(names, vec!["foo.py".to_string()]);
    }
}
