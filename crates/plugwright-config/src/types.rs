//! Configuration struct definitions.
//!
//! Every section derives `Default` with the same values as the embedded
//! `defaults.toml`, so a partially written file still deserializes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local plugin directory layout.
    pub plugins: PluginsSection,
    /// Remote catalog location and caching.
    pub catalog: CatalogSection,
    /// HTTP client settings.
    pub http: HttpSection,
    /// Logging and tracing.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// PluginsSection
// ---------------------------------------------------------------------------

/// Where plugins live and how their files are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    /// Plugin directory. Relative paths are resolved against the working
    /// directory.
    pub dir: PathBuf,
    /// Recognized plugin file extension, without the leading dot.
    pub extension: String,
    /// Version ledger file name inside `dir`.
    pub ledger_file: String,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plugins"),
            extension: "py".to_owned(),
            ledger_file: "version.json".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// CatalogSection
// ---------------------------------------------------------------------------

/// Remote catalog settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// Base URL. The index is `<source>/list.json` and plugin sources are
    /// `<source>/<name>/main.<extension>`.
    pub source: String,
    /// How long a fetched catalog is reused, in seconds.
    pub ttl_secs: u64,
    /// Largest response body accepted from the catalog host.
    pub max_download_bytes: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            source: "https://plugins.example.org/catalog/".to_owned(),
            ttl_secs: 120,
            max_download_bytes: 10_485_760,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpSection
// ---------------------------------------------------------------------------

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "plugwright".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["plugwright_plugins=debug",
    /// "reqwest=warn"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
