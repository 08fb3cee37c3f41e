//! Plugwright Test - Shared test utilities for plugwright.
//!
//! This crate provides in-memory implementations of the manager's
//! filesystem and transport seams, plus catalog fixtures.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! plugwright-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use plugwright_test::{MemoryFs, MockTransport, catalog_json};
//!
//! let fs = MemoryFs::new().with_file("plugins/foo.py", "print(1)");
//! let transport = MockTransport::new()
//!     .with_response(CATALOG_URL, HttpResponse::ok(catalog_json(&[("foo", 2.0)])));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

/// Install a test tracing subscriber honoring `RUST_LOG`. Safe to call from
/// every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
