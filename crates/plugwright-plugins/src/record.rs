//! Plugin records and the on-disk layout they map to.
//!
//! A plugin named `sticker` with extension `py` lives at
//! `<dir>/sticker.py` while active and at `<dir>/sticker.py.disabled`
//! while disabled. Records never touch the disk themselves; they only
//! derive paths from a [`PluginLayout`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

/// Suffix appended to the active file name to mark a plugin as disabled.
pub const DISABLED_SUFFIX: &str = "disabled";

/// Where plugin files live and which extension the host loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginLayout {
    dir: PathBuf,
    extension: String,
}

impl PluginLayout {
    /// Create a layout for `dir` with the host's recognized `extension`
    /// (without the leading dot).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension: String = extension.into();
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_owned(),
        }
    }

    /// The plugin directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The recognized extension, without the leading dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// File name of the active form, e.g. `sticker.py`.
    #[must_use]
    pub fn active_file_name(&self, name: &str) -> String {
        format!("{name}.{}", self.extension)
    }

    /// File name of the disabled form, e.g. `sticker.py.disabled`.
    #[must_use]
    pub fn disabled_file_name(&self, name: &str) -> String {
        format!("{name}.{}.{DISABLED_SUFFIX}", self.extension)
    }

    /// Full path of the active form.
    #[must_use]
    pub fn active_path(&self, name: &str) -> PathBuf {
        self.dir.join(self.active_file_name(name))
    }

    /// Full path of the disabled form.
    #[must_use]
    pub fn disabled_path(&self, name: &str) -> PathBuf {
        self.dir.join(self.disabled_file_name(name))
    }

    /// Recover the plugin name from a directory entry.
    ///
    /// Returns `None` for files that are neither an active nor a disabled
    /// plugin file (including the bare suffix with an empty stem).
    #[must_use]
    pub fn parse_file_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let disabled_tail = format!(".{}.{DISABLED_SUFFIX}", self.extension);
        let active_tail = format!(".{}", self.extension);

        let name = file_name
            .strip_suffix(disabled_tail.as_str())
            .or_else(|| file_name.strip_suffix(active_tail.as_str()))?;

        (!name.is_empty()).then_some(name)
    }
}

/// A plugin as seen from the local plugin directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Unique plugin name, also the stem of its backing file.
    pub name: String,
    /// `true` iff the active form exists on disk (the host loads it).
    pub status: bool,
    /// `true` iff the version ledger has an entry for this name.
    #[serde(default)]
    pub installed: bool,
    /// Locally recorded version, absent if never installed.
    pub version: Option<f64>,
}

impl PluginRecord {
    /// A record for a name with no file and no ledger entry.
    #[must_use]
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: false,
            installed: false,
            version: None,
        }
    }

    /// Path of the active form under `layout`.
    #[must_use]
    pub fn active_path(&self, layout: &PluginLayout) -> PathBuf {
        layout.active_path(&self.name)
    }

    /// Path of the disabled form under `layout`.
    #[must_use]
    pub fn disabled_path(&self, layout: &PluginLayout) -> PathBuf {
        layout.disabled_path(&self.name)
    }
}

/// A plugin as advertised by the remote catalog.
///
/// `record.version` holds the catalog version; `record.status` and
/// `record.installed` are probed locally, never taken from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePluginRecord {
    /// Shared identity and local state.
    #[serde(flatten)]
    pub record: PluginRecord,
    /// Catalog grouping.
    pub section: String,
    /// Who maintains the plugin.
    pub maintainer: String,
    /// Human-readable source size.
    pub size: String,
    /// Whether the catalog marks the plugin as supported.
    pub supported: bool,
    /// Short description.
    #[serde(rename = "des")]
    pub description: String,
}

impl RemotePluginRecord {
    /// The plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// The catalog version.
    #[must_use]
    pub fn remote_version(&self) -> Option<f64> {
        self.record.version
    }
}

/// One descriptor in the catalog's `list` array, as sent over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Plugin name.
    pub name: String,
    /// Catalog version. Accepts both `1.2` and `"1.2"`.
    #[serde(deserialize_with = "deserialize_version")]
    pub version: f64,
    /// Catalog grouping.
    #[serde(default)]
    pub section: String,
    /// Maintainer.
    #[serde(default)]
    pub maintainer: String,
    /// Human-readable size.
    #[serde(default)]
    pub size: String,
    /// Supported flag.
    #[serde(default)]
    pub supported: bool,
    /// Description.
    #[serde(default)]
    pub des: String,
}

impl CatalogEntry {
    /// Build a remote record, decorated with the locally probed load status.
    #[must_use]
    pub fn into_record(self, status: bool) -> RemotePluginRecord {
        RemotePluginRecord {
            record: PluginRecord {
                name: self.name,
                status,
                installed: false,
                version: Some(self.version),
            },
            section: self.section,
            maintainer: self.maintainer,
            size: self.size,
            supported: self.supported,
            description: self.des,
        }
    }
}

pub(crate) fn deserialize_version<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let version = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid version {s:?}: {e}")))?,
    };

    // JSON cannot represent NaN or infinity, so such a version could never
    // be written back to the ledger.
    if !version.is_finite() {
        return Err(serde::de::Error::custom(format!(
            "version must be a finite number, got {version}"
        )));
    }
    Ok(version)
}
