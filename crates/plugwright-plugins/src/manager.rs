//! The plugin manager: reconciles files, ledger and catalog.
//!
//! A plugin's effective state is the tuple
//! (`installed`, `status`, local version, remote version), computed on
//! demand from three stores the manager owns:
//!
//! - the plugin directory, through a [`FileStateGateway`]
//! - the [`VersionLedger`], loaded lazily on first use and kept for the
//!   lifetime of the manager
//! - the [`CatalogCache`]
//!
//! Lifecycle commands return `Ok(false)` when nothing changed (unknown
//! plugin, lost rename race, failed download) and `Err` only for hard
//! failures: the catalog cannot be fetched, the plugin directory cannot be
//! read, or the ledger cannot be read or written.
//!
//! Mutating file sections for one name are serialized through a per-name
//! lock. Downloads happen outside that lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::{CatalogCache, CatalogSnapshot, DEFAULT_CATALOG_TTL};
use crate::error::PluginResult;
use crate::fs::PluginFs;
use crate::gateway::FileStateGateway;
use crate::ledger::{LEDGER_FILE_NAME, VersionLedger};
use crate::name::is_valid_name;
use crate::record::{PluginLayout, PluginRecord, RemotePluginRecord};
use crate::transport::Transport;

/// Settings needed to build a [`PluginManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Plugin directory and recognized extension.
    pub layout: PluginLayout,
    /// Base URL of the remote catalog.
    pub source: String,
    /// How long a catalog snapshot is reused.
    pub catalog_ttl: Duration,
    /// Ledger file name inside the plugin directory.
    pub ledger_file: String,
}

impl ManagerConfig {
    /// Settings with the default freshness window and ledger file name.
    #[must_use]
    pub fn new(layout: PluginLayout, source: impl Into<String>) -> Self {
        Self {
            layout,
            source: source.into(),
            catalog_ttl: DEFAULT_CATALOG_TTL,
            ledger_file: LEDGER_FILE_NAME.to_owned(),
        }
    }

    /// Override the catalog freshness window.
    #[must_use]
    pub fn with_catalog_ttl(mut self, ttl: Duration) -> Self {
        self.catalog_ttl = ttl;
        self
    }

    /// Override the ledger file name.
    #[must_use]
    pub fn with_ledger_file(mut self, file_name: impl Into<String>) -> Self {
        self.ledger_file = file_name.into();
        self
    }
}

/// Whether a plugin at `local` should be replaced by the catalog's `remote`.
///
/// - no local version: never
/// - local version exactly `0`: never (pinned)
/// - remote unknown: never
/// - otherwise iff `local < remote`
#[must_use]
#[allow(clippy::float_cmp)]
pub fn update_available(local: Option<f64>, remote: Option<f64>) -> bool {
    match (local, remote) {
        (Some(local), Some(remote)) if local != 0.0 => local < remote,
        _ => false,
    }
}

#[derive(Debug, Default)]
struct NameLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    /// Run `f` while holding the lock for `name`.
    ///
    /// The entry is dropped again once no caller holds or waits for it, so
    /// the map only contains names with work in flight.
    fn run<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let handle = {
            let mut locks = self.map();
            Arc::clone(locks.entry(name.to_owned()).or_default())
        };

        let result = {
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut locks = self.map();
        drop(handle);
        if locks
            .get(name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(name);
        }
        result
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lifecycle engine for a single plugin directory.
///
/// Construct one per process and pass it (usually behind an `Arc`) to
/// whatever consumes it. All methods take `&self`.
#[derive(Debug)]
pub struct PluginManager {
    fs: Arc<dyn PluginFs>,
    transport: Arc<dyn Transport>,
    gateway: FileStateGateway,
    catalog: CatalogCache,
    ledger_path: PathBuf,
    ledger: Mutex<Option<VersionLedger>>,
    name_locks: NameLocks,
}

impl PluginManager {
    /// Create a manager over `fs` and `transport`.
    ///
    /// Nothing is read until the first query.
    #[must_use]
    pub fn new(config: ManagerConfig, fs: Arc<dyn PluginFs>, transport: Arc<dyn Transport>) -> Self {
        let gateway = FileStateGateway::new(Arc::clone(&fs), config.layout.clone());
        let catalog = CatalogCache::new(
            Arc::clone(&transport),
            gateway.clone(),
            config.source,
            config.catalog_ttl,
        );
        let ledger_path = config.layout.dir().join(&config.ledger_file);

        Self {
            fs,
            transport,
            gateway,
            catalog,
            ledger_path,
            ledger: Mutex::new(None),
            name_locks: NameLocks::default(),
        }
    }

    /// Plugin directory layout.
    #[must_use]
    pub fn layout(&self) -> &PluginLayout {
        self.gateway.layout()
    }

    /// The catalog cache.
    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    // -----------------------------------------------------------------------
    // Local queries
    // -----------------------------------------------------------------------

    /// Scan the plugin directory and build a record per plugin name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or the ledger cannot
    /// be loaded.
    pub fn list_local(&self) -> PluginResult<Vec<PluginRecord>> {
        let names = self.gateway.scan()?;
        self.with_ledger(|ledger| {
            Ok(names
                .into_iter()
                .map(|name| self.local_record(ledger, name))
                .collect())
        })
    }

    /// The local record for `name`, if a plugin file with that name exists.
    ///
    /// # Errors
    ///
    /// See [`PluginManager::list_local`].
    pub fn get_local_plugin(&self, name: &str) -> PluginResult<Option<PluginRecord>> {
        Ok(self.list_local()?.into_iter().find(|p| p.name == name))
    }

    /// Whether the ledger has an entry for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded.
    pub fn is_installed(&self, name: &str) -> PluginResult<bool> {
        self.with_ledger(|ledger| Ok(ledger.is_installed(name)))
    }

    /// Whether the host currently loads `name` (its active file exists).
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.gateway.is_loaded(name)
    }

    /// Installed version of `name` according to the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded.
    pub fn local_version(&self, name: &str) -> PluginResult<Option<f64>> {
        self.with_ledger(|ledger| Ok(ledger.get_version(name)))
    }

    /// Catalog version of `name` from the last fetched snapshot.
    #[must_use]
    pub fn remote_version(&self, name: &str) -> Option<f64> {
        self.catalog.remote_version(name)
    }

    /// Whether `name` has a newer version in the last fetched catalog.
    ///
    /// Does not fetch; see [`update_available`] for the policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded.
    pub fn needs_update(&self, name: &str) -> PluginResult<bool> {
        let local = self.local_version(name)?;
        Ok(update_available(local, self.remote_version(name)))
    }

    /// Re-read the ledger from disk, discarding the in-memory copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or parsed.
    pub fn reload_ledger(&self) -> PluginResult<()> {
        let ledger = VersionLedger::load(Arc::clone(&self.fs), self.ledger_path.clone())?;
        *self.ledger.lock().unwrap_or_else(PoisonError::into_inner) = Some(ledger);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Remote queries
    // -----------------------------------------------------------------------

    /// The remote catalog, fetched if the cached snapshot is stale.
    ///
    /// The returned records are copies whose `status` and `installed` flags
    /// reflect the local state at the time of this call.
    ///
    /// # Errors
    ///
    /// Returns a catalog error if a fetch was needed and failed, or an error
    /// if the ledger cannot be loaded.
    pub async fn list_remote(&self) -> PluginResult<Vec<RemotePluginRecord>> {
        let snapshot = self.catalog.get().await?;
        self.decorate(&snapshot)
    }

    /// Refetch the catalog now, ignoring the freshness window.
    ///
    /// # Errors
    ///
    /// See [`PluginManager::list_remote`].
    pub async fn refresh_remote(&self) -> PluginResult<Vec<RemotePluginRecord>> {
        let snapshot = self.catalog.refresh().await?;
        self.decorate(&snapshot)
    }

    /// The remote record for `name`, if the catalog lists it.
    ///
    /// # Errors
    ///
    /// See [`PluginManager::list_remote`].
    pub async fn get_remote_plugin(&self, name: &str) -> PluginResult<Option<RemotePluginRecord>> {
        Ok(self.list_remote().await?.into_iter().find(|p| p.name() == name))
    }

    // -----------------------------------------------------------------------
    // Lifecycle commands
    // -----------------------------------------------------------------------

    /// Download `name` from the catalog, replace any local copy, and record
    /// the catalog version in the ledger.
    ///
    /// Returns `Ok(false)` if the catalog does not list `name` or the
    /// download does not answer `200 OK`; the ledger is untouched then.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be fetched or the ledger
    /// cannot be written.
    pub async fn install(&self, name: &str) -> PluginResult<bool> {
        if !is_valid_name(name) {
            debug!(plugin = %name, "Refusing to install plugin with unusable name");
            return Ok(false);
        }

        let snapshot = self.catalog.get().await?;
        let Some(remote) = snapshot.get(name) else {
            info!(plugin = %name, "Plugin not found in catalog");
            return Ok(false);
        };
        let Some(version) = remote.remote_version() else {
            return Ok(false);
        };

        let url = self.catalog.source_url(name, self.layout().extension());
        let source = match self.transport.get(&url).await {
            Ok(response) if response.is_ok() => response.body,
            Ok(response) => {
                warn!(plugin = %name, url = %url, status = response.status, "Plugin download failed");
                return Ok(false);
            },
            Err(e) => {
                warn!(plugin = %name, url = %url, error = %e, "Plugin download failed");
                return Ok(false);
            },
        };

        self.with_name_lock(name, || {
            if !self.gateway.write_source(name, &source) {
                return Ok(false);
            }
            self.with_ledger(|ledger| ledger.set_version(name, version))?;
            info!(plugin = %name, version, "Installed plugin");
            Ok(true)
        })
    }

    /// Reinstall `name` if the catalog has a newer version.
    ///
    /// Returns `Ok(false)` if no update is needed or the plugin is unknown.
    ///
    /// # Errors
    ///
    /// See [`PluginManager::install`].
    pub async fn update(&self, name: &str) -> PluginResult<bool> {
        self.catalog.get().await?;
        if !self.needs_update(name)? {
            debug!(plugin = %name, "No update needed");
            return Ok(false);
        }
        self.install(name).await
    }

    /// Try [`PluginManager::update`] for every catalog plugin, in catalog
    /// order, and return the records that were actually updated.
    ///
    /// Individual failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the catalog itself cannot be fetched.
    pub async fn update_all(&self) -> PluginResult<Vec<RemotePluginRecord>> {
        let snapshot = self.catalog.get().await?;
        let mut updated = Vec::new();

        for plugin in snapshot.plugins() {
            match self.update(plugin.name()).await {
                Ok(true) => {
                    let mut record = plugin.clone();
                    record.record.status = self.gateway.is_loaded(plugin.name());
                    record.record.installed = true;
                    updated.push(record);
                },
                Ok(false) => {},
                Err(e) => {
                    warn!(plugin = %plugin.name(), error = %e, "Update failed, skipping");
                },
            }
        }

        info!(count = updated.len(), "Finished updating plugins");
        Ok(updated)
    }

    /// Enable a local plugin (disabled form → active form).
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin directory or ledger cannot be read.
    pub fn enable(&self, name: &str) -> PluginResult<bool> {
        if self.get_local_plugin(name)?.is_none() {
            debug!(plugin = %name, "Cannot enable unknown plugin");
            return Ok(false);
        }
        Ok(self.with_name_lock(name, || self.gateway.enable(name)))
    }

    /// Disable a local plugin (active form → disabled form).
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin directory or ledger cannot be read.
    pub fn disable(&self, name: &str) -> PluginResult<bool> {
        if self.get_local_plugin(name)?.is_none() {
            debug!(plugin = %name, "Cannot disable unknown plugin");
            return Ok(false);
        }
        Ok(self.with_name_lock(name, || self.gateway.disable(name)))
    }

    /// Enable when `enabled` is true, disable otherwise.
    ///
    /// # Errors
    ///
    /// See [`PluginManager::enable`].
    pub fn set_status(&self, name: &str, enabled: bool) -> PluginResult<bool> {
        if enabled {
            self.enable(name)
        } else {
            self.disable(name)
        }
    }

    /// Delete both forms of a local plugin and its ledger entry.
    ///
    /// Returns `Ok(false)` if no file for `name` exists, or if a file could
    /// not be deleted (the ledger entry is kept then).
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin directory cannot be read or the ledger
    /// cannot be read or written.
    pub fn remove_plugin(&self, name: &str) -> PluginResult<bool> {
        if self.get_local_plugin(name)?.is_none() {
            debug!(plugin = %name, "Cannot remove unknown plugin");
            return Ok(false);
        }

        self.with_name_lock(name, || {
            if !self.gateway.remove(name) {
                return Ok(false);
            }
            self.with_ledger(|ledger| ledger.remove(name))?;
            info!(plugin = %name, "Removed plugin");
            Ok(true)
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn local_record(&self, ledger: &VersionLedger, name: String) -> PluginRecord {
        PluginRecord {
            status: self.gateway.is_loaded(&name),
            installed: ledger.is_installed(&name),
            version: ledger.get_version(&name),
            name,
        }
    }

    fn decorate(&self, snapshot: &CatalogSnapshot) -> PluginResult<Vec<RemotePluginRecord>> {
        self.with_ledger(|ledger| {
            Ok(snapshot
                .plugins()
                .iter()
                .map(|plugin| {
                    let mut record = plugin.clone();
                    record.record.status = self.gateway.is_loaded(plugin.name());
                    record.record.installed = ledger.is_installed(plugin.name());
                    record
                })
                .collect())
        })
    }

    /// Run `f` against the ledger, loading it on first use.
    fn with_ledger<R>(
        &self,
        f: impl FnOnce(&mut VersionLedger) -> PluginResult<R>,
    ) -> PluginResult<R> {
        let mut guard = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let ledger = match guard.take() {
            Some(ledger) => ledger,
            None => VersionLedger::load(Arc::clone(&self.fs), self.ledger_path.clone())?,
        };
        f(guard.insert(ledger))
    }

    fn with_name_lock<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        self.name_locks.run(name, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_policy() {
        assert!(!update_available(None, Some(2.0)));
        assert!(!update_available(Some(0.0), Some(2.0)));
        assert!(!update_available(Some(1.0), None));
        assert!(!update_available(Some(2.0), Some(2.0)));
        assert!(!update_available(Some(3.0), Some(2.0)));
        assert!(update_available(Some(1.0), Some(2.0)));
        assert!(update_available(Some(1.0), Some(1.01)));
    }

    #[test]
    fn name_locks_are_dropped_when_idle() {
        let locks = NameLocks::default();
        let inner = locks.run("foo", || {
            locks.run("bar", || locks.map().len())
        });
        assert_eq!(inner, 2);
        assert!(locks.map().is_empty());
    }

    #[test]
    fn name_locks_serialize_same_name() {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

        let locks = Arc::new(NameLocks::default());
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        locks.run("foo", || {
                            if inside.swap(true, Ordering::SeqCst) {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            std::thread::yield_now();
                            inside.store(false, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(locks.map().is_empty());
    }

    #[test]
    fn config_defaults() {
        let config = ManagerConfig::new(PluginLayout::new("plugins", "py"), "https://x/");
        assert_eq!(config.catalog_ttl, DEFAULT_CATALOG_TTL);
        assert_eq!(config.ledger_file, LEDGER_FILE_NAME);

        let config = config
            .with_catalog_ttl(Duration::from_secs(5))
            .with_ledger_file("versions.json");
        assert_eq!(config.catalog_ttl, Duration::from_secs(5));
        assert_eq!(config.ledger_file, "versions.json");
    }
}
