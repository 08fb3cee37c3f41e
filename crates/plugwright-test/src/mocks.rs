//! Mock implementations for testing.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use plugwright_plugins::{HttpResponse, PluginError, PluginFs, PluginResult, Transport};

#[derive(Debug, Default)]
struct MemoryFsState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    fail_writes: bool,
    fail_removes: bool,
    operations: Vec<String>,
}

/// In-memory [`PluginFs`].
///
/// Clones share the same state, so a test can keep one handle and give
/// another to the manager.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<MemoryFsState>>,
}

impl MemoryFs {
    /// An empty filesystem with no directories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (and its parent directory).
    #[must_use]
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.put(path, contents);
        self
    }

    /// Add an empty directory.
    #[must_use]
    pub fn with_dir(self, path: impl Into<PathBuf>) -> Self {
        self.lock().dirs.insert(path.into());
        self
    }

    /// Write a file (and its parent directory).
    pub fn put(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            state.dirs.insert(parent.to_path_buf());
        }
        state.files.insert(path, contents.into());
    }

    /// Contents of a file, if present.
    #[must_use]
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(path.as_ref()).cloned()
    }

    /// Contents of a file as UTF-8, if present.
    #[must_use]
    pub fn contents_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.contents(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Whether a file exists.
    #[must_use]
    pub fn has_file(&self, path: impl AsRef<Path>) -> bool {
        self.lock().files.contains_key(path.as_ref())
    }

    /// Every successful mutation so far, in order, as `"write <path>"`,
    /// `"remove <path>"` or `"rename <from> -> <to>"`.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    /// Make every subsequent `write_atomic` fail with `PermissionDenied`.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make every subsequent `remove_file` of an existing file fail with
    /// `PermissionDenied`.
    pub fn fail_removes(&self, fail: bool) {
        self.lock().fail_removes = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryFsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file", path.display()),
    )
}

fn denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{}: permission denied", path.display()),
    )
}

impl PluginFs for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.has_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.lock();
        if state.files.contains_key(to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{}: already exists", to.display()),
            ));
        }
        let contents = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_path_buf(), contents);
        state
            .operations
            .push(format!("rename {} -> {}", from.display(), to.display()));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        if !state.files.contains_key(path) {
            return Err(not_found(path));
        }
        if state.fail_removes {
            return Err(denied(path));
        }
        state.files.remove(path);
        state.operations.push(format!("remove {}", path.display()));
        Ok(())
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let state = self.lock();
        if !state.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        Ok(state
            .files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| path.file_name()?.to_str().map(str::to_owned))
            .collect())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.contents(path).ok_or_else(|| not_found(path))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(denied(path));
        }
        if let Some(parent) = path.parent() {
            state.dirs.insert(parent.to_path_buf());
        }
        state.files.insert(path.to_path_buf(), contents.to_vec());
        state.operations.push(format!("write {}", path.display()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(HttpResponse),
    Failure(String),
}

#[derive(Debug, Default)]
struct MockTransportState {
    scripts: HashMap<String, VecDeque<Scripted>>,
    requests: Vec<String>,
}

/// Scripted [`Transport`] that records every requested URL.
///
/// Each URL has a queue of replies. Replies are consumed in order and the
/// last one repeats. Unscripted URLs answer `404`.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    /// A transport that answers `404` to everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`.
    #[must_use]
    pub fn with_response(self, url: impl Into<String>, response: HttpResponse) -> Self {
        self.push_response(url, response);
        self
    }

    /// Queue a transport failure for `url`.
    #[must_use]
    pub fn with_failure(self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.push_failure(url, message);
        self
    }

    /// Queue a response for `url`.
    pub fn push_response(&self, url: impl Into<String>, response: HttpResponse) {
        self.push(url.into(), Scripted::Reply(response));
    }

    /// Queue a transport failure for `url`.
    pub fn push_failure(&self, url: impl Into<String>, message: impl Into<String>) {
        self.push(url.into(), Scripted::Failure(message.into()));
    }

    /// Drop everything queued for `url` and queue `response` instead.
    pub fn replace_response(&self, url: impl Into<String>, response: HttpResponse) {
        let url = url.into();
        let mut state = self.lock();
        state
            .scripts
            .insert(url, VecDeque::from([Scripted::Reply(response)]));
    }

    /// Every URL requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// How many times `url` was requested.
    #[must_use]
    pub fn request_count(&self, url: &str) -> usize {
        self.lock().requests.iter().filter(|u| *u == url).count()
    }

    fn push(&self, url: String, scripted: Scripted) {
        self.lock().scripts.entry(url).or_default().push_back(scripted);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockTransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> PluginResult<HttpResponse> {
        let scripted = {
            let mut state = self.lock();
            state.requests.push(url.to_owned());
            match state.scripts.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match scripted {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Failure(message)) => Err(PluginError::Transport(message)),
            None => Ok(HttpResponse::status(404)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fs_rename_semantics() {
        let fs = MemoryFs::new().with_file("p/a.py", "a");
        assert!(fs.rename(Path::new("p/a.py"), Path::new("p/b.py")).is_ok());
        assert!(!fs.has_file("p/a.py"));
        assert_eq!(fs.contents_string("p/b.py").as_deref(), Some("a"));

        let err = fs
            .rename(Path::new("p/a.py"), Path::new("p/c.py"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(fs.operations(), vec!["rename p/a.py -> p/b.py".to_string()]);
    }

    #[test]
    fn memory_fs_lists_only_direct_children() {
        let fs = MemoryFs::new()
            .with_file("p/a.py", "")
            .with_file("p/sub/b.py", "")
            .with_dir("empty");
        assert_eq!(fs.list_dir(Path::new("p")).unwrap(), vec!["a.py".to_string()]);
        assert!(fs.list_dir(Path::new("empty")).unwrap().is_empty());
        assert!(fs.list_dir(Path::new("missing")).is_err());
    }

    #[tokio::test]
    async fn mock_transport_replays_and_counts() {
        let transport = MockTransport::new()
            .with_response("u", HttpResponse::ok("one"))
            .with_response("u", HttpResponse::status(500));

        assert_eq!(transport.get("u").await.unwrap().body, b"one");
        assert_eq!(transport.get("u").await.unwrap().status, 500);
        assert_eq!(transport.get("u").await.unwrap().status, 500);
        assert_eq!(transport.get("other").await.unwrap().status, 404);
        assert_eq!(transport.request_count("u"), 3);
    }
}
