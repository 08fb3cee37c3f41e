//! plugwright - plugin lifecycle manager CLI.
//!
//! Every subcommand is translated into one [`Request`], handed to
//! [`PluginManager::handle`], and the [`Response`] is rendered as a table or
//! as JSON. The process exits non-zero when the response reports a failure.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plugwright_config::Config;
use plugwright_plugins::{LocalFs, PluginManager, Request, Response};
use plugwright_telemetry::{LogConfig, LogFormat};
use tracing::debug;

mod config_bridge;
mod render;
mod theme;

use render::{OutputFormat, filter_response, render};

/// plugwright - install, update and toggle host plugins
#[derive(Parser)]
#[command(name = "plugwright")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty (default) or json
    #[arg(long, global = true, default_value = "pretty")]
    format: String,

    /// Path to an additional configuration file
    #[arg(long, global = true, env = "PLUGWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List local plugins, or the remote catalog with --remote
    List {
        /// List the remote catalog instead of the plugin directory
        #[arg(short, long)]
        remote: bool,

        /// Only show plugins whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Show one plugin
    Info {
        /// Plugin name
        name: String,

        /// Look the plugin up in the remote catalog
        #[arg(short, long)]
        remote: bool,
    },

    /// Download a plugin from the catalog
    Install {
        /// Plugin name
        name: String,
    },

    /// Reinstall a plugin if the catalog has a newer version
    Update {
        /// Plugin name
        name: String,
    },

    /// Update every plugin that has a newer catalog version
    UpdateAll,

    /// Enable a disabled plugin
    Enable {
        /// Plugin name
        name: String,
    },

    /// Disable an enabled plugin
    Disable {
        /// Plugin name
        name: String,
    },

    /// Delete a plugin and its ledger entry
    Remove {
        /// Plugin name
        name: String,
    },

    /// Show install, load and update state of a plugin
    Status {
        /// Plugin name
        name: String,
    },
}

impl Commands {
    /// The request for this command and a short description of it.
    fn into_request(self) -> (Request, String, Option<String>) {
        match self {
            Self::List { remote, filter } => {
                let request = if remote {
                    Request::ListRemote
                } else {
                    Request::ListLocal
                };
                (request, "list plugins".to_owned(), filter)
            },
            Self::Info { name, remote } => {
                let action = format!("show {name}");
                let request = if remote {
                    Request::GetRemote { name }
                } else {
                    Request::GetLocal { name }
                };
                (request, action, None)
            },
            Self::Install { name } => (
                Request::Install { name: name.clone() },
                format!("install {name}"),
                None,
            ),
            Self::Update { name } => (
                Request::Update { name: name.clone() },
                format!("update {name}"),
                None,
            ),
            Self::UpdateAll => (Request::UpdateAll, "update plugins".to_owned(), None),
            Self::Enable { name } => (
                Request::Enable { name: name.clone() },
                format!("enable {name}"),
                None,
            ),
            Self::Disable { name } => (
                Request::Disable { name: name.clone() },
                format!("disable {name}"),
                None,
            ),
            Self::Remove { name } => (
                Request::Remove { name: name.clone() },
                format!("remove {name}"),
                None,
            ),
            Self::Status { name } => (
                Request::Status { name: name.clone() },
                format!("check {name}"),
                None,
            ),
        }
    }
}

fn init_logging(cfg: Option<&Config>, verbose: bool) {
    let mut log_config = cfg.map_or_else(
        || LogConfig::new("info").with_format(LogFormat::Compact),
        |cfg| LogConfig::from(&cfg.logging),
    );
    if verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = plugwright_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let output_format = OutputFormat::parse(&cli.format);

    let resolved = match Config::load(cli.config.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => {
            init_logging(None, cli.verbose);
            return Err(e).context("failed to load configuration");
        },
    };
    init_logging(Some(&resolved.config), cli.verbose);
    debug!(files = ?resolved.loaded_files, "Configuration loaded");

    let cfg = &resolved.config;
    let transport =
        config_bridge::to_transport(cfg).context("failed to create HTTP client")?;
    let manager = PluginManager::new(
        config_bridge::to_manager_config(cfg),
        Arc::new(LocalFs),
        Arc::new(transport),
    );

    let (request, action, filter) = cli.command.into_request();
    let mut response = manager.handle(request).await;
    if let Some(needle) = filter.as_deref() {
        response = filter_response(response, needle);
    }

    let output = render(&response, output_format, &action);
    if matches!(response, Response::Error { .. }) && output_format == OutputFormat::Pretty {
        eprintln!("{output}");
    } else {
        println!("{output}");
    }

    Ok(if response.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("plugwright").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_list_remote_with_filter() {
        let cli = parse(&["list", "--remote", "--filter", "st"]);
        let (request, _, filter) = cli.command.into_request();
        assert_eq!(request, Request::ListRemote);
        assert_eq!(filter.as_deref(), Some("st"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["install", "sticker", "--format", "json", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.format, "json");
        let (request, action, _) = cli.command.into_request();
        assert_eq!(
            request,
            Request::Install {
                name: "sticker".into()
            }
        );
        assert_eq!(action, "install sticker");
    }

    #[test]
    fn test_info_remote() {
        let (request, _, _) = parse(&["info", "weather", "--remote"]).command.into_request();
        assert_eq!(
            request,
            Request::GetRemote {
                name: "weather".into()
            }
        );
    }

    #[test]
    fn test_update_all_kebab_case() {
        let (request, _, _) = parse(&["update-all"]).command.into_request();
        assert_eq!(request, Request::UpdateAll);
    }

    #[test]
    fn test_missing_name_rejected() {
        assert!(Cli::try_parse_from(["plugwright", "enable"]).is_err());
    }
}
