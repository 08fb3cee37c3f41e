//! Environment variable fallbacks.
//!
//! Environment variables only fill fields that no config file set. They
//! never override a value written in a file.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::merge::set_path;

/// Environment variables consulted, and the dotted field each one fills.
pub const ENV_FALLBACKS: &[(&str, &str)] = &[
    ("PLUGWRIGHT_PLUGIN_DIR", "plugins.dir"),
    ("PLUGWRIGHT_CATALOG_SOURCE", "catalog.source"),
    ("PLUGWRIGHT_LOG_LEVEL", "logging.level"),
];

/// Snapshot of the `PLUGWRIGHT_*` variables in the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("PLUGWRIGHT_"))
        .collect()
}

/// Apply [`ENV_FALLBACKS`] to `merged` for every field not in `file_set`.
///
/// Empty variables are ignored. Returns how many fields were filled.
pub fn apply_env_fallbacks(
    merged: &mut toml::Value,
    file_set: &BTreeSet<String>,
    env_vars: &HashMap<String, String>,
) -> usize {
    let mut applied = 0usize;
    for (var, field) in ENV_FALLBACKS {
        if file_set.contains(*field) {
            continue;
        }
        let Some(value) = env_vars.get(*var).filter(|v| !v.is_empty()) else {
            continue;
        };
        debug!(var, field, "applying environment fallback");
        set_path(merged, field, toml::Value::String(value.clone()));
        applied = applied.saturating_add(1);
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_fills_unset_fields() {
        let mut merged: toml::Value = toml::from_str("[plugins]\ndir = \"plugins\"").unwrap();
        let applied = apply_env_fallbacks(
            &mut merged,
            &BTreeSet::new(),
            &env(&[("PLUGWRIGHT_PLUGIN_DIR", "/srv/plugins")]),
        );
        assert_eq!(applied, 1);
        assert_eq!(merged["plugins"]["dir"].as_str(), Some("/srv/plugins"));
    }

    #[test]
    fn test_file_values_win() {
        let mut merged: toml::Value = toml::from_str("[plugins]\ndir = \"mine\"").unwrap();
        let file_set = BTreeSet::from(["plugins.dir".to_owned()]);
        let applied = apply_env_fallbacks(
            &mut merged,
            &file_set,
            &env(&[("PLUGWRIGHT_PLUGIN_DIR", "/srv/plugins")]),
        );
        assert_eq!(applied, 0);
        assert_eq!(merged["plugins"]["dir"].as_str(), Some("mine"));
    }

    #[test]
    fn test_empty_value_ignored() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"").unwrap();
        let applied = apply_env_fallbacks(
            &mut merged,
            &BTreeSet::new(),
            &env(&[("PLUGWRIGHT_LOG_LEVEL", "")]),
        );
        assert_eq!(applied, 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("info"));
    }
}
