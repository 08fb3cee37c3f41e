//! Plugin lifecycle management for a host application.
//!
//! Reconciles three sources of truth about the host's extension modules:
//!
//! - the plugin directory, where `<name>.<ext>` is loaded by the host and
//!   `<name>.<ext>.disabled` is present but inert
//! - the version ledger (`version.json`), which records what was installed
//!   and at which version
//! - the remote catalog (`<source>/list.json`), which lists what can be
//!   installed and at which version
//!
//! The main entry point is [`PluginManager`]:
//!
//! - [`PluginRecord`] / [`RemotePluginRecord`]: value types returned to callers
//! - [`FileStateGateway`]: remove / enable / disable as file operations
//! - [`VersionLedger`]: name → installed version, persisted on every change
//! - [`CatalogCache`]: time-windowed, single-flight catalog fetch
//! - [`api`]: serde request/response types for frontends
//!
//! Disk and network access go through the [`PluginFs`] and [`Transport`]
//! traits so the whole engine can run against in-memory fakes.
//!
//! # Versions
//!
//! A version is a single ordered number. A ledger version of exactly `0`
//! means "installed, never update automatically".

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod api;
pub mod catalog;
pub mod error;
pub mod fs;
pub mod gateway;
pub mod ledger;
pub mod manager;
pub mod name;
pub mod record;
pub mod transport;

pub use api::{PluginStatusReport, Request, Response};
pub use catalog::{CATALOG_FILE_NAME, CatalogCache, CatalogSnapshot, DEFAULT_CATALOG_TTL};
pub use error::{PluginError, PluginResult};
pub use fs::{LocalFs, PluginFs};
pub use gateway::FileStateGateway;
pub use ledger::{LEDGER_FILE_NAME, VersionLedger};
pub use manager::{ManagerConfig, PluginManager, update_available};
pub use name::{is_valid_name, validate_name};
pub use record::{CatalogEntry, DISABLED_SUFFIX, PluginLayout, PluginRecord, RemotePluginRecord};
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{HttpResponse, Transport, join_url};
