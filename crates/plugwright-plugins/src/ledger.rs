//! Version ledger: which plugins are installed, and at what version.
//!
//! The ledger is a JSON object mapping plugin name to version, stored next
//! to the plugins themselves (`plugins/version.json` by default):
//!
//! ```json
//! {
//!     "bar": 1.0,
//!     "sticker": 0
//! }
//! ```
//!
//! Every mutation rewrites the whole document before returning. A version
//! of exactly `0` marks a plugin as installed but never auto-updated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::fs::PluginFs;
use crate::record::deserialize_version;

/// Standard ledger file name inside the plugin directory.
pub const LEDGER_FILE_NAME: &str = "version.json";

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(transparent)]
struct LedgerVersion(#[serde(deserialize_with = "deserialize_version")] f64);

/// In-memory ledger bound to its backing file.
#[derive(Debug)]
pub struct VersionLedger {
    fs: Arc<dyn PluginFs>,
    path: PathBuf,
    versions: BTreeMap<String, f64>,
}

impl VersionLedger {
    /// An empty ledger that will be written to `path`.
    #[must_use]
    pub fn new(fs: Arc<dyn PluginFs>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
            versions: BTreeMap::new(),
        }
    }

    /// Load the ledger at `path`. A missing file is an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::LedgerError`] if the file exists but cannot be
    /// read or is not a JSON object of numeric versions. A corrupt ledger is
    /// never treated as empty, since the next save would drop every entry.
    pub fn load(fs: Arc<dyn PluginFs>, path: impl Into<PathBuf>) -> PluginResult<Self> {
        let mut ledger = Self::new(fs, path);
        ledger.reload()?;
        Ok(ledger)
    }

    /// Re-read the backing file, replacing the in-memory mapping.
    ///
    /// # Errors
    ///
    /// See [`VersionLedger::load`].
    pub fn reload(&mut self) -> PluginResult<()> {
        let content = match self.fs.read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No version ledger yet");
                self.versions.clear();
                return Ok(());
            },
            Err(e) => {
                return Err(PluginError::LedgerError {
                    path: self.path.clone(),
                    message: format!("failed to read ledger: {e}"),
                });
            },
        };

        let parsed: BTreeMap<String, LedgerVersion> =
            serde_json::from_slice(&content).map_err(|e| PluginError::LedgerError {
                path: self.path.clone(),
                message: format!("failed to parse ledger: {e}"),
            })?;

        self.versions = parsed.into_iter().map(|(k, v)| (k, v.0)).collect();
        debug!(path = %self.path.display(), entries = self.versions.len(), "Loaded version ledger");
        Ok(())
    }

    /// Write the full mapping to disk, replacing the previous file.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::LedgerError`] if serialization or the write fails.
    pub fn save(&self) -> PluginResult<()> {
        let mut body = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
        self.versions
            .serialize(&mut serializer)
            .map_err(|e| PluginError::LedgerError {
                path: self.path.clone(),
                message: format!("failed to serialize ledger: {e}"),
            })?;
        body.push(b'\n');

        self.fs
            .write_atomic(&self.path, &body)
            .map_err(|e| PluginError::LedgerError {
                path: self.path.clone(),
                message: format!("failed to write ledger: {e}"),
            })?;

        debug!(path = %self.path.display(), entries = self.versions.len(), "Saved version ledger");
        Ok(())
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Installed version of `name`, if any. `Some(0.0)` is a real entry.
    #[must_use]
    pub fn get_version(&self, name: &str) -> Option<f64> {
        self.versions.get(name).copied()
    }

    /// Record `version` for `name` and persist before returning.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::LedgerError`] if `version` is not finite or the
    /// save fails. The in-memory entry is rolled back in that case.
    pub fn set_version(&mut self, name: &str, version: f64) -> PluginResult<()> {
        if !version.is_finite() {
            return Err(PluginError::LedgerError {
                path: self.path.clone(),
                message: format!("refusing to record non-finite version {version} for {name}"),
            });
        }
        let previous = self.versions.insert(name.to_owned(), version);
        if let Err(e) = self.save() {
            match previous {
                Some(v) => self.versions.insert(name.to_owned(), v),
                None => self.versions.remove(name),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Drop the entry for `name` and persist. Returns `true` if an entry was
    /// removed; nothing is written when there was none.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::LedgerError`] if the save fails. The in-memory
    /// entry is restored in that case.
    pub fn remove(&mut self, name: &str) -> PluginResult<bool> {
        let Some(previous) = self.versions.remove(name) else {
            return Ok(false);
        };
        if let Err(e) = self.save() {
            self.versions.insert(name.to_owned(), previous);
            return Err(e);
        }
        Ok(true)
    }

    /// Whether `name` has an entry, regardless of files on disk.
    #[must_use]
    pub fn is_installed(&self, name: &str) -> bool {
        self.versions.contains_key(name)
    }

    /// All entries, ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.versions.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use tempfile::TempDir;

    fn ledger_at(dir: &TempDir) -> PluginResult<VersionLedger> {
        VersionLedger::load(Arc::new(LocalFs), dir.path().join(LEDGER_FILE_NAME))
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_at(&dir).unwrap();
        assert!(ledger.is_empty());
        assert!(!dir.path().join(LEDGER_FILE_NAME).exists());
    }

    #[test]
    fn set_version_persists_immediately() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir).unwrap();
        ledger.set_version("bar", 1.0).unwrap();

        let reloaded = ledger_at(&dir).unwrap();
        assert_eq!(reloaded.get_version("bar"), Some(1.0));
        assert!(reloaded.is_installed("bar"));
    }

    #[test]
    fn zero_is_a_real_entry() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir).unwrap();
        ledger.set_version("pinned", 0.0).unwrap();
        assert_eq!(ledger.get_version("pinned"), Some(0.0));
        assert!(ledger.is_installed("pinned"));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir).unwrap();
        ledger.set_version("bar", 1.0).unwrap();

        assert!(ledger.remove("bar").unwrap());
        assert!(!ledger.remove("bar").unwrap());
        assert!(ledger_at(&dir).unwrap().is_empty());
    }

    #[test]
    fn non_finite_versions_are_refused() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir).unwrap();
        ledger.set_version("bar", 1.0).unwrap();

        for version in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = ledger.set_version("bar", version).unwrap_err();
            assert!(matches!(err, PluginError::LedgerError { .. }));
        }

        assert_eq!(ledger.get_version("bar"), Some(1.0));
        assert_eq!(ledger_at(&dir).unwrap().get_version("bar"), Some(1.0));
    }

    #[test]
    fn file_is_pretty_printed_with_four_spaces() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir).unwrap();
        ledger.set_version("bar", 1.5).unwrap();

        let content = std::fs::read_to_string(dir.path().join(LEDGER_FILE_NAME)).unwrap();
        assert_eq!(content, "{\n    \"bar\": 1.5\n}\n");
    }

    #[test]
    fn accepts_string_versions_from_older_writers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(LEDGER_FILE_NAME),
            r#"{"bar": "1.2", "foo": 3}"#,
        )
        .unwrap();
        let ledger = ledger_at(&dir).unwrap();
        assert_eq!(ledger.get_version("bar"), Some(1.2));
        assert_eq!(ledger.get_version("foo"), Some(3.0));
    }

    #[test]
    fn corrupt_ledger_fails_fast() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(LEDGER_FILE_NAME), "not json").unwrap();
        let err = ledger_at(&dir).unwrap_err();
        assert!(matches!(err, PluginError::LedgerError { .. }));
    }
}
