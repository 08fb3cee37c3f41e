//! Plugin manager error types.

use std::path::PathBuf;

/// Errors from plugin manager operations.
///
/// Only hard failures are represented here. A plugin that cannot be found,
/// a rename that loses a race, or a source download that does not return
/// `200 OK` are reported as `Ok(false)` by the operations themselves.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The plugin name cannot be mapped to a file or URL safely.
    #[error("invalid plugin name: {0}")]
    InvalidName(String),

    /// The catalog request did not complete.
    #[error("catalog fetch failed for {url}: {message}")]
    CatalogFetch {
        /// Catalog URL.
        url: String,
        /// Failure reason.
        message: String,
    },

    /// The catalog answered with a non-success status.
    #[error("catalog at {url} returned HTTP {status}")]
    CatalogStatus {
        /// Catalog URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The catalog document is not the expected JSON shape.
    #[error("catalog parse error for {url}: {message}")]
    CatalogParse {
        /// Catalog URL.
        url: String,
        /// Parse error message.
        message: String,
    },

    /// The HTTP transport could not be constructed or failed outright.
    #[error("transport error: {0}")]
    Transport(String),

    /// Version ledger read/write/parse error.
    #[error("ledger error at {path}: {message}")]
    LedgerError {
        /// Path to the ledger file.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for plugin manager operations.
pub type PluginResult<T> = Result<T, PluginError>;
