//! Request/response boundary for frontends.
//!
//! Frontends (the CLI, an admin page, an RPC endpoint) talk to the manager
//! only through [`Request`] and [`Response`], both of which are plain serde
//! types. [`PluginManager::handle`] never fails: hard errors come back as
//! [`Response::Error`].
//!
//! ```json
//! {"op": "set_status", "name": "sticker", "enabled": false}
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PluginResult;
use crate::manager::PluginManager;
use crate::record::{PluginRecord, RemotePluginRecord};

/// A query or command addressed to the plugin manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// List plugins in the local directory.
    ListLocal,
    /// List plugins in the remote catalog.
    ListRemote,
    /// Get one local plugin.
    GetLocal {
        /// Plugin name.
        name: String,
    },
    /// Get one catalog plugin.
    GetRemote {
        /// Plugin name.
        name: String,
    },
    /// Install from the catalog.
    Install {
        /// Plugin name.
        name: String,
    },
    /// Update if the catalog is newer.
    Update {
        /// Plugin name.
        name: String,
    },
    /// Update every plugin that has a newer catalog version.
    UpdateAll,
    /// Enable a local plugin.
    Enable {
        /// Plugin name.
        name: String,
    },
    /// Disable a local plugin.
    Disable {
        /// Plugin name.
        name: String,
    },
    /// Enable or disable a local plugin.
    SetStatus {
        /// Plugin name.
        name: String,
        /// Target state.
        enabled: bool,
    },
    /// Delete a local plugin and its ledger entry.
    Remove {
        /// Plugin name.
        name: String,
    },
    /// Report install/load/update state for one plugin.
    Status {
        /// Plugin name.
        name: String,
    },
}

/// Reconciled state of one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginStatusReport {
    /// Plugin name.
    pub name: String,
    /// Has a ledger entry.
    pub installed: bool,
    /// Active file exists.
    pub loaded: bool,
    /// Ledger version.
    pub local_version: Option<f64>,
    /// Catalog version, if the catalog has been fetched and lists it.
    pub remote_version: Option<f64>,
    /// Whether an update would be applied.
    pub needs_update: bool,
}

/// The manager's answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    /// Local listing.
    Local(Vec<PluginRecord>),
    /// Catalog listing.
    Remote(Vec<RemotePluginRecord>),
    /// One local plugin, if found.
    LocalPlugin(Option<PluginRecord>),
    /// One catalog plugin, if found.
    RemotePlugin(Option<RemotePluginRecord>),
    /// Outcome of a lifecycle command.
    Done {
        /// Whether anything changed.
        success: bool,
    },
    /// Plugins changed by an update-all.
    Updated(Vec<RemotePluginRecord>),
    /// Status report.
    Status(PluginStatusReport),
    /// A hard failure.
    Error {
        /// Human-readable error.
        message: String,
    },
}

impl Response {
    /// Whether this response reports a failure (`Error` or an unsuccessful
    /// command).
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Error { .. } | Self::Done { success: false }
        )
    }
}

impl PluginManager {
    /// Execute `request` and wrap the outcome in a [`Response`].
    pub async fn handle(&self, request: Request) -> Response {
        debug!(?request, "Handling request");
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Request failed");
                Response::Error {
                    message: e.to_string(),
                }
            },
        }
    }

    async fn dispatch(&self, request: Request) -> PluginResult<Response> {
        let done = |success: bool| Response::Done { success };

        Ok(match request {
            Request::ListLocal => Response::Local(self.list_local()?),
            Request::ListRemote => Response::Remote(self.list_remote().await?),
            Request::GetLocal { name } => Response::LocalPlugin(self.get_local_plugin(&name)?),
            Request::GetRemote { name } => {
                Response::RemotePlugin(self.get_remote_plugin(&name).await?)
            },
            Request::Install { name } => done(self.install(&name).await?),
            Request::Update { name } => done(self.update(&name).await?),
            Request::UpdateAll => Response::Updated(self.update_all().await?),
            Request::Enable { name } => done(self.enable(&name)?),
            Request::Disable { name } => done(self.disable(&name)?),
            Request::SetStatus { name, enabled } => done(self.set_status(&name, enabled)?),
            Request::Remove { name } => done(self.remove_plugin(&name)?),
            Request::Status { name } => Response::Status(self.status_report(&name).await?),
        })
    }

    /// Reconciled state of `name`.
    ///
    /// Tries to bring the catalog up to date first; if that fails the last
    /// known catalog versions are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded.
    pub async fn status_report(&self, name: &str) -> PluginResult<PluginStatusReport> {
        if let Err(e) = self.catalog().get().await {
            warn!(plugin = %name, error = %e, "Catalog unavailable, using last known versions");
        }

        Ok(PluginStatusReport {
            name: name.to_owned(),
            installed: self.is_installed(name)?,
            loaded: self.is_loaded(name),
            local_version: self.local_version(name)?,
            remote_version: self.remote_version(name),
            needs_update: self.needs_update(name)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let request: Request =
            serde_json::from_str(r#"{"op": "set_status", "name": "sticker", "enabled": false}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::SetStatus {
                name: "sticker".into(),
                enabled: false
            }
        );

        let request: Request = serde_json::from_str(r#"{"op": "update_all"}"#).unwrap();
        assert_eq!(request, Request::UpdateAll);
    }

    #[test]
    fn response_wire_format() {
        let json = serde_json::to_value(Response::Done { success: true }).unwrap();
        assert_eq!(json["kind"], "done");
        assert_eq!(json["data"]["success"], true);
    }

    #[test]
    fn failure_detection() {
        assert!(Response::Done { success: false }.is_failure());
        assert!(
            Response::Error {
                message: "x".into()
            }
            .is_failure()
        );
        assert!(!Response::Done { success: true }.is_failure());
        assert!(!Response::Local(Vec::new()).is_failure());
    }
}
