//! Plugin name validation.
//!
//! A plugin name is the stem of its backing file and a path segment of its
//! catalog URL, so it must never be able to escape the plugin directory.

use crate::error::{PluginError, PluginResult};

/// Validate that a plugin name is usable as a file stem and URL segment.
///
/// # Errors
///
/// Returns [`PluginError::InvalidName`] if the name is empty, starts with a
/// dot, or contains a path separator, `..`, or a NUL byte.
pub fn validate_name(name: &str) -> PluginResult<()> {
    if name.is_empty() {
        return Err(PluginError::InvalidName(
            "plugin name must not be empty".into(),
        ));
    }
    if name.starts_with('.') {
        return Err(PluginError::InvalidName(format!(
            "plugin name must not start with a dot, got: {name}"
        )));
    }
    if name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(PluginError::InvalidName(format!(
            "plugin name must not contain path separators or '..', got: {name}"
        )));
    }
    Ok(())
}

/// Check whether a string is a valid plugin name without building an error.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    validate_name(name).is_ok()
}
