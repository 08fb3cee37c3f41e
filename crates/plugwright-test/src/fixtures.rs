//! Catalog fixtures.

use std::path::PathBuf;
use std::sync::Arc;

use plugwright_plugins::{ManagerConfig, PluginLayout, PluginManager};

use crate::mocks::{MemoryFs, MockTransport};

/// Plugin directory used by [`test_manager`].
pub const TEST_PLUGIN_DIR: &str = "plugins";

/// Catalog base URL used by [`test_manager`].
pub const TEST_SOURCE: &str = "https://catalog.test/plugins/";

/// Catalog index URL for [`TEST_SOURCE`].
pub const TEST_CATALOG_URL: &str = "https://catalog.test/plugins/list.json";

/// Source URL of `name` under [`TEST_SOURCE`] with the `py` extension.
#[must_use]
pub fn test_source_url(name: &str) -> String {
    format!("{TEST_SOURCE}{name}/main.py")
}

/// Path of a file inside [`TEST_PLUGIN_DIR`].
#[must_use]
pub fn test_plugin_path(file_name: &str) -> PathBuf {
    PathBuf::from(TEST_PLUGIN_DIR).join(file_name)
}

/// A catalog document listing `(name, version)` pairs with filler metadata.
#[must_use]
pub fn catalog_json(entries: &[(&str, f64)]) -> Vec<u8> {
    let list: Vec<serde_json::Value> = entries
        .iter()
        .map(|(name, version)| {
            serde_json::json!({
                "name": name,
                "version": version.to_string(),
                "section": "chat",
                "maintainer": "tester",
                "size": "1.0 kb",
                "supported": true,
                "des": format!("{name} test plugin"),
            })
        })
        .collect();

    serde_json::to_vec(&serde_json::json!({ "list": list })).unwrap_or_default()
}

/// A manager over `fs` and `transport` using [`TEST_PLUGIN_DIR`],
/// [`TEST_SOURCE`] and the `py` extension.
#[must_use]
pub fn test_manager(fs: &MemoryFs, transport: &MockTransport) -> PluginManager {
    PluginManager::new(
        ManagerConfig::new(PluginLayout::new(TEST_PLUGIN_DIR, "py"), TEST_SOURCE),
        Arc::new(fs.clone()),
        Arc::new(transport.clone()),
    )
}
