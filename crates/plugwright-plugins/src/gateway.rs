//! File state transitions for plugins.
//!
//! The gateway owns the three destructive transitions (remove, enable,
//! disable) plus the write of a freshly downloaded source. Every failure is
//! logged with its OS error and reported as `false`; nothing here returns
//! a raw I/O error for a per-plugin operation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::fs::PluginFs;
use crate::name::is_valid_name;
use crate::record::PluginLayout;

/// Performs file-level plugin state changes under a [`PluginLayout`].
#[derive(Debug, Clone)]
pub struct FileStateGateway {
    fs: Arc<dyn PluginFs>,
    layout: PluginLayout,
}

impl FileStateGateway {
    /// Create a gateway over `fs` using `layout`.
    #[must_use]
    pub fn new(fs: Arc<dyn PluginFs>, layout: PluginLayout) -> Self {
        Self { fs, layout }
    }

    /// The layout this gateway operates on.
    #[must_use]
    pub fn layout(&self) -> &PluginLayout {
        &self.layout
    }

    /// Whether the plugin's active form exists, i.e. the host loads it.
    ///
    /// When both forms exist the active one wins.
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        is_valid_name(name) && self.fs.exists(&self.layout.active_path(name))
    }

    /// Whether either form of the plugin exists.
    #[must_use]
    pub fn is_present(&self, name: &str) -> bool {
        is_valid_name(name)
            && (self.fs.exists(&self.layout.active_path(name))
                || self.fs.exists(&self.layout.disabled_path(name)))
    }

    /// Delete both forms of the plugin. Missing files are not an error.
    ///
    /// Returns `false` only if a file existed and could not be deleted.
    pub fn remove(&self, name: &str) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        let active = self.remove_if_present(&self.layout.active_path(name));
        let disabled = self.remove_if_present(&self.layout.disabled_path(name));
        active && disabled
    }

    /// Rename the disabled form to the active form.
    ///
    /// Returns `true` iff the plugin is now loaded because of this rename.
    pub fn enable(&self, name: &str) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        self.rename(
            name,
            &self.layout.disabled_path(name),
            &self.layout.active_path(name),
        )
    }

    /// Rename the active form to the disabled form.
    ///
    /// Returns `true` iff the plugin is now unloaded because of this rename.
    pub fn disable(&self, name: &str) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        self.rename(
            name,
            &self.layout.active_path(name),
            &self.layout.disabled_path(name),
        )
    }

    /// Replace any local copy of the plugin with `source` as the active form.
    ///
    /// The active file is replaced in one step, so a failed write leaves the
    /// previous copy in place. A disabled copy is deleted only after the new
    /// file is written; if that delete fails both forms remain and the
    /// active one wins.
    ///
    /// Returns `false` if the new file could not be written.
    pub fn write_source(&self, name: &str, source: &[u8]) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        let path = self.layout.active_path(name);
        if let Err(e) = self.fs.write_atomic(&path, source) {
            warn!(plugin = %name, path = %path.display(), error = %e, "Failed to write plugin source");
            return false;
        }
        debug!(plugin = %name, path = %path.display(), bytes = source.len(), "Wrote plugin source");

        self.remove_if_present(&self.layout.disabled_path(name));
        true
    }

    /// Names of every plugin file in the plugin directory, sorted and
    /// deduplicated. A missing directory is an empty one.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory exists but cannot be read.
    pub fn scan(&self) -> std::io::Result<Vec<String>> {
        let entries = match self.fs.list_dir(self.layout.dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.layout.dir().display(), "Plugin directory does not exist yet");
                return Ok(Vec::new());
            },
            Err(e) => return Err(e),
        };

        let names: BTreeSet<String> = entries
            .iter()
            .filter_map(|file_name| self.layout.parse_file_name(file_name))
            .filter(|name| {
                let ok = is_valid_name(name);
                if !ok {
                    debug!(plugin = %name, "Skipping plugin file with unusable name");
                }
                ok
            })
            .map(str::to_owned)
            .collect();

        Ok(names.into_iter().collect())
    }

    fn remove_if_present(&self, path: &Path) -> bool {
        match self.fs.remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed plugin file");
                true
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove plugin file");
                false
            },
        }
    }

    fn rename(&self, name: &str, from: &Path, to: &Path) -> bool {
        match self.fs.rename(from, to) {
            Ok(()) => {
                debug!(plugin = %name, from = %from.display(), to = %to.display(), "Renamed plugin file");
                true
            },
            Err(e) => {
                warn!(
                    plugin = %name,
                    from = %from.display(),
                    to = %to.display(),
                    error = %e,
                    "Plugin rename failed"
                );
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use tempfile::TempDir;

    fn gateway(dir: &TempDir) -> FileStateGateway {
        FileStateGateway::new(Arc::new(LocalFs), PluginLayout::new(dir.path(), "py"))
    }

    #[test]
    fn disable_then_enable_round_trips() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("foo.py"), "print(1)").unwrap();
        let gw = gateway(&dir);

        assert!(gw.is_loaded("foo"));
        assert!(gw.disable("foo"));
        assert!(!gw.is_loaded("foo"));
        assert!(dir.path().join("foo.py.disabled").exists());

        assert!(gw.enable("foo"));
        assert!(gw.is_loaded("foo"));
        assert!(!dir.path().join("foo.py.disabled").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("foo.py")).unwrap(),
            "print(1)"
        );
    }

    #[test]
    fn enable_without_disabled_file_fails() {
        let dir = TempDir::new().unwrap();
        let gw = gateway(&dir);
        assert!(!gw.enable("ghost"));
        assert!(!gw.disable("ghost"));
    }

    #[test]
    fn enable_refuses_when_both_forms_exist() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("foo.py"), "new").unwrap();
        std::fs::write(dir.path().join("foo.py.disabled"), "old").unwrap();
        let gw = gateway(&dir);

        assert!(gw.is_loaded("foo"));
        assert!(!gw.enable("foo"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("foo.py")).unwrap(),
            "new"
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("foo.py"), "").unwrap();
        std::fs::write(dir.path().join("foo.py.disabled"), "").unwrap();
        let gw = gateway(&dir);

        assert!(gw.remove("foo"));
        assert!(!gw.is_present("foo"));
        assert!(gw.remove("foo"));
    }

    #[test]
    fn write_source_replaces_disabled_copy() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("foo.py.disabled"), "old").unwrap();
        let gw = gateway(&dir);

        assert!(gw.write_source("foo", b"new"));
        assert!(gw.is_loaded("foo"));
        assert!(!dir.path().join("foo.py.disabled").exists());
    }

    #[test]
    fn write_source_overwrites_active_copy() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("foo.py"), "old").unwrap();
        let gw = gateway(&dir);

        assert!(gw.write_source("foo", b"new"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("foo.py")).unwrap(),
            "new"
        );
        assert!(!gw.write_source("../foo", b"x"));
    }

    #[test]
    fn scan_recovers_names() {
        let dir = TempDir::new().unwrap();
        for file in ["foo.py", "bar.py.disabled", "version.json", "foo.py.disabled"] {
            std::fs::write(dir.path().join(file), "").unwrap();
        }
        let gw = gateway(&dir);
        assert_eq!(gw.scan().unwrap(), vec!["bar".to_string(), "foo".to_string()]);
    }

    #[test]
    fn scan_of_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let gw = FileStateGateway::new(
            Arc::new(LocalFs),
            PluginLayout::new(dir.path().join("nope"), "py"),
        );
        assert!(gw.scan().unwrap().is_empty());
    }

    #[test]
    fn invalid_names_never_touch_disk() {
        let dir = TempDir::new().unwrap();
        let gw = gateway(&dir);
        assert!(!gw.remove("../x"));
        assert!(!gw.enable("../x"));
        assert!(!gw.is_loaded("../x"));
    }
}
