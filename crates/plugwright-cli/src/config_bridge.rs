//! Conversion from [`Config`] to plugin manager settings.

use std::time::Duration;

use plugwright_config::Config;
use plugwright_plugins::{ManagerConfig, PluginLayout, PluginResult, ReqwestTransport};

/// Convert config to [`ManagerConfig`].
#[must_use]
pub(crate) fn to_manager_config(cfg: &Config) -> ManagerConfig {
    let layout = PluginLayout::new(&cfg.plugins.dir, &cfg.plugins.extension);
    ManagerConfig::new(layout, &cfg.catalog.source)
        .with_catalog_ttl(Duration::from_secs(cfg.catalog.ttl_secs))
        .with_ledger_file(&cfg.plugins.ledger_file)
}

/// Build the HTTP transport described by `cfg`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub(crate) fn to_transport(cfg: &Config) -> PluginResult<ReqwestTransport> {
    ReqwestTransport::new(
        Duration::from_secs(cfg.http.timeout_secs),
        &cfg.http.user_agent,
        cfg.catalog.max_download_bytes,
    )
}
