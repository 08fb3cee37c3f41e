//! Remote catalog fetch with a time-windowed cache.
//!
//! The catalog lives at `<source>/list.json` and looks like:
//!
//! ```json
//! { "list": [ { "name": "bar", "version": "2.0", "section": "chat",
//!               "maintainer": "someone", "size": "3.1 kb",
//!               "supported": true, "des": "..." } ] }
//! ```
//!
//! # Caching
//!
//! A successful fetch produces an immutable [`CatalogSnapshot`] that is
//! reused until the freshness window elapses. Fetches are single-flight: a
//! guard is held across the network call, and callers that were waiting on
//! it re-check freshness and reuse the snapshot it produced. A failed fetch
//! leaves the previous snapshot in place and returns the error.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::gateway::FileStateGateway;
use crate::name::is_valid_name;
use crate::record::{CatalogEntry, RemotePluginRecord};
use crate::transport::{Transport, join_url};

/// File name of the catalog index under the source URL.
pub const CATALOG_FILE_NAME: &str = "list.json";

/// Default freshness window.
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    list: Vec<CatalogEntry>,
}

/// One successful catalog fetch: the records plus a name → version index.
#[derive(Debug)]
pub struct CatalogSnapshot {
    plugins: Vec<RemotePluginRecord>,
    versions: HashMap<String, f64>,
    fetched_at: Instant,
}

impl CatalogSnapshot {
    fn new(plugins: Vec<RemotePluginRecord>, fetched_at: Instant) -> Self {
        let mut versions = HashMap::with_capacity(plugins.len());
        for plugin in &plugins {
            if let Some(version) = plugin.remote_version() {
                versions.entry(plugin.name().to_owned()).or_insert(version);
            }
        }
        Self {
            plugins,
            versions,
            fetched_at,
        }
    }

    /// All catalog records in catalog order.
    #[must_use]
    pub fn plugins(&self) -> &[RemotePluginRecord] {
        &self.plugins
    }

    /// First record named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RemotePluginRecord> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    /// Catalog version of `name`.
    #[must_use]
    pub fn version(&self, name: &str) -> Option<f64> {
        self.versions.get(name).copied()
    }

    /// When this snapshot was fetched.
    #[must_use]
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the catalog listed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Fetches and caches the remote catalog.
#[derive(Debug)]
pub struct CatalogCache {
    transport: Arc<dyn Transport>,
    gateway: FileStateGateway,
    source: String,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<CatalogSnapshot>>>,
    fetch_guard: tokio::sync::Mutex<()>,
}

impl CatalogCache {
    /// Create an empty cache for the catalog at `source`.
    ///
    /// `gateway` is used to probe the local load status of each record.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        gateway: FileStateGateway,
        source: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            gateway,
            source: source.into(),
            ttl,
            snapshot: RwLock::new(None),
            fetch_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Base URL of the catalog.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// URL of the catalog index.
    #[must_use]
    pub fn index_url(&self) -> String {
        join_url(&self.source, CATALOG_FILE_NAME)
    }

    /// URL of a plugin's source file with the given extension.
    #[must_use]
    pub fn source_url(&self, name: &str, extension: &str) -> String {
        join_url(&self.source, &format!("{name}/main.{extension}"))
    }

    /// The freshness window.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The last successful snapshot, regardless of age.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<CatalogSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The last snapshot if it is still inside the freshness window.
    #[must_use]
    pub fn fresh(&self) -> Option<Arc<CatalogSnapshot>> {
        self.cached()
            .filter(|snapshot| snapshot.fetched_at.elapsed() < self.ttl)
    }

    /// Catalog version of `name` from the last snapshot, without fetching.
    #[must_use]
    pub fn remote_version(&self, name: &str) -> Option<f64> {
        self.cached().and_then(|snapshot| snapshot.version(name))
    }

    /// Forget the snapshot so the next [`CatalogCache::get`] refetches.
    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The catalog, refetched only if the cached snapshot is stale.
    ///
    /// # Errors
    ///
    /// Returns a catalog error if a refetch was needed and failed.
    pub async fn get(&self) -> PluginResult<Arc<CatalogSnapshot>> {
        if let Some(snapshot) = self.fresh() {
            debug!(entries = snapshot.len(), "Catalog cache hit");
            return Ok(snapshot);
        }

        let _guard = self.fetch_guard.lock().await;

        // Someone else may have refreshed while we waited for the guard.
        if let Some(snapshot) = self.fresh() {
            debug!(entries = snapshot.len(), "Catalog refreshed by concurrent caller");
            return Ok(snapshot);
        }

        self.fetch_locked().await
    }

    /// Refetch the catalog now, ignoring the freshness window.
    ///
    /// # Errors
    ///
    /// Returns a catalog error if the fetch fails. The previous snapshot is
    /// kept.
    pub async fn refresh(&self) -> PluginResult<Arc<CatalogSnapshot>> {
        let _guard = self.fetch_guard.lock().await;
        self.fetch_locked().await
    }

    async fn fetch_locked(&self) -> PluginResult<Arc<CatalogSnapshot>> {
        let url = self.index_url();

        let response = self.transport.get(&url).await.map_err(|e| {
            warn!(url = %url, error = %e, "Catalog fetch failed");
            PluginError::CatalogFetch {
                url: url.clone(),
                message: e.to_string(),
            }
        })?;

        if !response.is_ok() {
            warn!(url = %url, status = response.status, "Catalog returned non-OK status");
            return Err(PluginError::CatalogStatus {
                url,
                status: response.status,
            });
        }

        let document: CatalogDocument =
            serde_json::from_slice(&response.body).map_err(|e| PluginError::CatalogParse {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let plugins: Vec<RemotePluginRecord> = document
            .list
            .into_iter()
            .filter(|entry| {
                let ok = is_valid_name(&entry.name);
                if !ok {
                    debug!(plugin = %entry.name, "Skipping catalog entry with unusable name");
                }
                ok
            })
            .map(|entry| {
                let status = self.gateway.is_loaded(&entry.name);
                entry.into_record(status)
            })
            .collect();

        let snapshot = Arc::new(CatalogSnapshot::new(plugins, Instant::now()));
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));

        info!(url = %url, entries = snapshot.len(), "Fetched plugin catalog");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::fs::LocalFs;
    use crate::record::PluginLayout;
    use crate::transport::HttpResponse;

    const CATALOG: &str = r#"{"list": [
        {"name": "bar", "version": "2.0", "section": "chat", "maintainer": "m",
         "size": "1 kb", "supported": true, "des": "bar plugin"},
        {"name": "foo", "version": 1, "section": "util", "maintainer": "n",
         "size": "2 kb", "supported": false, "des": "foo plugin"},
        {"name": "../evil", "version": 1}
    ]}"#;

    #[derive(Debug)]
    struct ScriptedTransport {
        responses: Mutex<Vec<PluginResult<HttpResponse>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<PluginResult<HttpResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, _url: &str) -> PluginResult<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                match responses.first() {
                    Some(Ok(r)) => Ok(r.clone()),
                    Some(Err(e)) => Err(PluginError::Transport(e.to_string())),
                    None => Ok(HttpResponse::status(404)),
                }
            }
        }
    }

    fn cache(dir: &TempDir, transport: Arc<ScriptedTransport>, ttl: Duration) -> CatalogCache {
        let gateway = FileStateGateway::new(Arc::new(LocalFs), PluginLayout::new(dir.path(), "py"));
        CatalogCache::new(transport, gateway, "https://catalog.test/plugins/", ttl)
    }

    #[tokio::test]
    async fn fetch_decorates_status_and_indexes_versions() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bar.py"), "").unwrap();
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::ok(CATALOG))]);
        let cache = cache(&dir, transport, DEFAULT_CATALOG_TTL);

        let snapshot = cache.get().await.unwrap();
        assert_eq!(snapshot.len(), 2, "unsafe names are dropped");
        assert!(snapshot.get("bar").unwrap().record.status);
        assert!(!snapshot.get("foo").unwrap().record.status);
        assert_eq!(snapshot.version("bar"), Some(2.0));
        assert_eq!(cache.remote_version("foo"), Some(1.0));
        assert_eq!(cache.index_url(), "https://catalog.test/plugins/list.json");
        assert_eq!(
            cache.source_url("bar", "py"),
            "https://catalog.test/plugins/bar/main.py"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_snapshot_inside_window() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::ok(CATALOG))]);
        let cache = cache(&dir, Arc::clone(&transport), Duration::from_secs(60));

        cache.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.get().await.unwrap();
        assert_eq!(transport.calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        cache.get().await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_ignores_window() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::ok(CATALOG))]);
        let cache = cache(&dir, Arc::clone(&transport), DEFAULT_CATALOG_TTL);

        cache.get().await.unwrap();
        cache.refresh().await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refetch_keeps_stale_snapshot() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::ok(CATALOG)),
            Ok(HttpResponse::status(503)),
        ]);
        let cache = cache(&dir, transport, Duration::from_secs(10));

        cache.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, PluginError::CatalogStatus { status: 503, .. }));
        assert_eq!(cache.cached().unwrap().len(), 2);
        assert_eq!(cache.remote_version("bar"), Some(2.0));
    }

    #[tokio::test]
    async fn malformed_catalog_is_an_error() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::ok("{\"plugins\": []}"))]);
        let cache = cache(&dir, transport, DEFAULT_CATALOG_TTL);

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, PluginError::CatalogParse { .. }));
        assert!(cache.cached().is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let transport =
            ScriptedTransport::new(vec![Err(PluginError::Transport("connection refused".into()))]);
        let cache = cache(&dir, transport, DEFAULT_CATALOG_TTL);

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, PluginError::CatalogFetch { .. }));
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::ok(CATALOG))]);
        let cache = cache(&dir, Arc::clone(&transport), DEFAULT_CATALOG_TTL);

        cache.get().await.unwrap();
        cache.invalidate();
        assert!(cache.cached().is_none());
        cache.get().await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::ok(CATALOG))]);
        let cache = Arc::new(cache(&dir, Arc::clone(&transport), DEFAULT_CATALOG_TTL));

        let (a, b) = tokio::join!(cache.get(), cache.get());
        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(b.unwrap().len(), 2);
        assert_eq!(transport.calls(), 1);
    }
}
