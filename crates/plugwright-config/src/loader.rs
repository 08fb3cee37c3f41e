//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `<config dir>/plugwright/config.toml` (user)
//! 3. Merge the file passed with `--config` (explicit)
//! 4. Apply env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Validate

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{deep_merge, leaf_paths};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration and the files that contributed to it.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final, validated configuration.
    pub config: Config,
    /// Config files merged, lowest precedence first.
    pub loaded_files: Vec<PathBuf>,
}

/// Default location of the user config file, if a config directory can be
/// determined for this platform.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("plugwright").join("config.toml"))
}

/// Load configuration from the process environment and standard locations.
///
/// `explicit` is a file named on the command line. Unlike the user file it
/// must exist.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, the explicit
/// file cannot be read, or the final configuration fails validation.
pub fn load(explicit: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_from(
        user_config_path().as_deref(),
        explicit,
        &collect_env_vars(),
    )
}

/// [`load`] with every input supplied by the caller.
///
/// # Errors
///
/// See [`load`].
pub fn load_from(
    user_path: Option<&Path>,
    explicit: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    // 1. Parse embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut file_set = BTreeSet::new();
    let mut loaded_files = Vec::new();

    // 2. User config.
    if let Some(path) = user_path {
        if let Some(overlay) = try_load_file(path)? {
            file_set.extend(leaf_paths(&overlay));
            deep_merge(&mut merged, &overlay);
            loaded_files.push(path.to_path_buf());
            info!(path = %path.display(), "loaded user config");
        }
    } else {
        debug!("no user config directory on this platform, skipping");
    }

    // 3. Explicit config.
    if let Some(path) = explicit {
        let overlay = read_file(path)?;
        file_set.extend(leaf_paths(&overlay));
        deep_merge(&mut merged, &overlay);
        loaded_files.push(path.to_path_buf());
        info!(path = %path.display(), "loaded config file");
    }

    // 4. Apply env var fallbacks for unset fields.
    let env_count = apply_env_fallbacks(&mut merged, &file_set, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    // 5. Deserialize.
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    // 6. Validate.
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering, no environment).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let content = read_to_string_limited(path)?;
    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    match read_file(path) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::ReadError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "config file not found, skipping");
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let content = read_to_string_limited(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

fn read_to_string_limited(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    // Checked after reading so there is no window between stat and read.
    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_without_files() {
        let resolved = load_from(None, None, &HashMap::new()).unwrap();
        assert_eq!(resolved.config, Config::default());
        assert!(resolved.loaded_files.is_empty());
    }

    #[test]
    fn test_missing_user_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let resolved =
            load_from(Some(&dir.path().join("absent.toml")), None, &HashMap::new()).unwrap();
        assert!(resolved.loaded_files.is_empty());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_from(None, Some(Path::new("/nonexistent/config.toml")), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_explicit_overrides_user() {
        let dir = tempfile::tempdir().unwrap();
        let user = write(
            &dir,
            "user.toml",
            "[catalog]\nttl_secs = 10\nsource = \"https://user/\"\n",
        );
        let explicit = write(&dir, "explicit.toml", "[catalog]\nttl_secs = 20\n");

        let resolved = load_from(Some(&user), Some(&explicit), &HashMap::new()).unwrap();
        assert_eq!(resolved.config.catalog.ttl_secs, 20);
        assert_eq!(resolved.config.catalog.source, "https://user/");
        assert_eq!(resolved.loaded_files, vec![user, explicit]);
    }

    #[test]
    fn test_env_fills_only_unset_fields() {
        let dir = tempfile::tempdir().unwrap();
        let user = write(&dir, "user.toml", "[plugins]\ndir = \"/opt/plugins\"\n");
        let env = HashMap::from([
            ("PLUGWRIGHT_PLUGIN_DIR".to_owned(), "/srv/plugins".to_owned()),
            ("PLUGWRIGHT_LOG_LEVEL".to_owned(), "debug".to_owned()),
        ]);

        let resolved = load_from(Some(&user), None, &env).unwrap();
        assert_eq!(resolved.config.plugins.dir, PathBuf::from("/opt/plugins"));
        assert_eq!(resolved.config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_merged_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = write(&dir, "bad.toml", "[plugins]\nextension = \".py\"\n");
        let result = load_from(None, Some(&explicit), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = write(&dir, "bad.toml", "[catalog\nttl_secs = ");
        let result = load_from(None, Some(&explicit), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = write(&dir, "bad.toml", "[catalog]\nttl_secs = \"soon\"\n");
        let result = load_from(None, Some(&explicit), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        let path = write(&dir, "huge.toml", &data);

        let result = try_load_file(&path);
        assert!(
            matches!(result, Err(ConfigError::ValidationError { .. })),
            "Expected ValidationError for oversized config, got: {result:?}"
        );
    }

    #[test]
    fn test_load_file_standalone() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "c.toml", "[http]\ntimeout_secs = 5\n");
        let config = load_file(&path).unwrap();
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.plugins, Default::default());
    }
}
