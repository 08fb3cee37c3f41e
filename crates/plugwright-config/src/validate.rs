//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_plugins(config)?;
    validate_catalog(config)?;
    validate_http(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_plugins(config: &Config) -> ConfigResult<()> {
    let p = &config.plugins;

    if p.dir.as_os_str().is_empty() {
        return Err(invalid("plugins.dir", "plugin directory must not be empty"));
    }

    if p.extension.is_empty() {
        return Err(invalid("plugins.extension", "extension must not be empty"));
    }
    if p.extension.contains(['.', '/', '\\']) {
        return Err(invalid(
            "plugins.extension",
            format!(
                "extension '{}' must be a bare suffix without dots or slashes",
                p.extension
            ),
        ));
    }

    if p.ledger_file.is_empty() {
        return Err(invalid("plugins.ledger_file", "ledger file name must not be empty"));
    }
    if p.ledger_file.contains(['/', '\\']) {
        return Err(invalid(
            "plugins.ledger_file",
            format!("ledger file '{}' must be a plain file name", p.ledger_file),
        ));
    }

    Ok(())
}

fn validate_catalog(config: &Config) -> ConfigResult<()> {
    let c = &config.catalog;

    let scheme_ok = c.source.starts_with("https://") || c.source.starts_with("http://");
    if !scheme_ok {
        return Err(invalid(
            "catalog.source",
            format!("catalog source '{}' must be an http or https URL", c.source),
        ));
    }

    if c.max_download_bytes == 0 {
        return Err(invalid(
            "catalog.max_download_bytes",
            "max_download_bytes must be greater than zero",
        ));
    }

    Ok(())
}

fn validate_http(config: &Config) -> ConfigResult<()> {
    if config.http.timeout_secs == 0 {
        return Err(invalid("http.timeout_secs", "timeout_secs must be greater than zero"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: &ConfigError) -> &str {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_extension_rules() {
        let mut config = Config::default();
        config.plugins.extension = String::new();
        assert_eq!(field_of(&validate(&config).unwrap_err()), "plugins.extension");

        config.plugins.extension = ".py".to_owned();
        assert_eq!(field_of(&validate(&config).unwrap_err()), "plugins.extension");

        config.plugins.extension = "py/x".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_ledger_file_rules() {
        let mut config = Config::default();
        config.plugins.ledger_file = String::new();
        assert_eq!(field_of(&validate(&config).unwrap_err()), "plugins.ledger_file");

        config.plugins.ledger_file = "../version.json".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_catalog_source_must_be_http() {
        let mut config = Config::default();
        config.catalog.source = "ftp://mirror/plugins".to_owned();
        assert_eq!(field_of(&validate(&config).unwrap_err()), "catalog.source");

        config.catalog.source = "http://localhost:8000/".to_owned();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = Config::default();
        config.http.timeout_secs = 0;
        assert_eq!(field_of(&validate(&config).unwrap_err()), "http.timeout_secs");

        let mut config = Config::default();
        config.catalog.max_download_bytes = 0;
        assert_eq!(
            field_of(&validate(&config).unwrap_err()),
            "catalog.max_download_bytes"
        );
    }

    #[test]
    fn test_zero_ttl_allowed() {
        let mut config = Config::default();
        config.catalog.ttl_secs = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_logging_rules() {
        let mut config = Config::default();
        config.logging.level = "loud".to_owned();
        assert_eq!(field_of(&validate(&config).unwrap_err()), "logging.level");

        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(&validate(&config).unwrap_err()), "logging.format");
    }
}
