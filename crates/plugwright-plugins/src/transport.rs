//! HTTP transport seam.
//!
//! The manager only ever issues `GET` requests and needs the status code and
//! body back, so the seam is a single async method. [`ReqwestTransport`] is
//! the production implementation (feature `http`).

use std::fmt;

use async_trait::async_trait;

use crate::error::PluginResult;

/// Status and body of a completed `GET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A `200 OK` response carrying `body`.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// A body-less response with `status`.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    /// Whether the status is exactly `200 OK`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Fetches URLs for the catalog cache and the installer.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Issue a `GET` for `url`.
    ///
    /// A non-success status is **not** an error: it comes back as an
    /// [`HttpResponse`] so callers can decide how hard to fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be completed at all
    /// (connection failure, timeout, oversized body).
    async fn get(&self, url: &str) -> PluginResult<HttpResponse>;
}

/// Join a base URL and a relative path with exactly one `/` between them.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(feature = "http")]
pub use reqwest_impl::ReqwestTransport;

#[cfg(feature = "http")]
mod reqwest_impl {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;
    use tracing::debug;

    use super::{HttpResponse, Transport};
    use crate::error::{PluginError, PluginResult};

    /// [`Transport`] backed by a shared `reqwest::Client`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
        max_body_bytes: u64,
    }

    impl ReqwestTransport {
        /// Build a client with a request `timeout`, a `user_agent`, and a cap
        /// on response body size.
        ///
        /// # Errors
        ///
        /// Returns [`PluginError::Transport`] if the client cannot be built.
        pub fn new(timeout: Duration, user_agent: &str, max_body_bytes: u64) -> PluginResult<Self> {
            let client = reqwest::Client::builder()
                .user_agent(user_agent)
                .redirect(reqwest::redirect::Policy::limited(10))
                .timeout(timeout)
                .build()
                .map_err(|e| PluginError::Transport(format!("failed to create HTTP client: {e}")))?;

            Ok(Self {
                client,
                max_body_bytes,
            })
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn get(&self, url: &str) -> PluginResult<HttpResponse> {
            debug!(url, "GET");

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| PluginError::Transport(format!("GET {url} failed: {e}")))?;

            let status = response.status().as_u16();

            if let Some(len) = response.content_length()
                && len > self.max_body_bytes
            {
                return Err(PluginError::Transport(format!(
                    "GET {url}: body of {len} bytes exceeds limit of {} bytes",
                    self.max_body_bytes
                )));
            }

            let body = read_with_limit(response, self.max_body_bytes, url).await?;
            Ok(HttpResponse { status, body })
        }
    }

    /// Stream a response body, failing once it grows past `max_size`.
    async fn read_with_limit(
        response: reqwest::Response,
        max_size: u64,
        url: &str,
    ) -> PluginResult<Vec<u8>> {
        let capacity =
            usize::try_from(response.content_length().unwrap_or(0).min(max_size)).unwrap_or(0);
        let mut bytes = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| PluginError::Transport(format!("GET {url}: read error: {e}")))?;
            bytes.extend_from_slice(&chunk);
            let current_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
            if current_size > max_size {
                return Err(PluginError::Transport(format!(
                    "GET {url}: body exceeds limit of {max_size} bytes"
                )));
            }
        }

        Ok(bytes)
    }
}
