//! Conditional HTTP fetching into a staging file.
//!
//! The fetcher only ever writes the path it is given; moving the result into
//! place is the sync engine's job.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::types::{LoaderError, LoaderResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("modloader/", env!("CARGO_PKG_VERSION"));

/// Result of a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server confirmed the cached copy is current. Nothing was written.
    NotModified,
    /// The body was written in full to the staging path.
    Fetched { etag: Option<String> },
}

/// Downloads a network asset into a staging file.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch `url` into `dest`, sending `etag` as `If-None-Match` when present.
    ///
    /// On error `dest` may hold a partial body; the caller removes it.
    async fn fetch_to(
        &self,
        url: &Url,
        etag: Option<&str>,
        dest: &Path,
    ) -> LoaderResult<FetchOutcome>;
}

/// `reqwest`-backed fetcher with a hard per-request deadline.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> LoaderResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_inner(
        &self,
        url: &Url,
        etag: Option<&str>,
        dest: &Path,
    ) -> LoaderResult<FetchOutcome> {
        let mut request = self.client.get(url.clone());
        if let Some(tag) = etag {
            request = request.header(IF_NONE_MATCH, tag);
        }

        let mut response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!("{url} not modified");
            return Ok(FetchOutcome::NotModified);
        }

        if !status.is_success() {
            return Err(LoaderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let new_etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!("Fetched {written} bytes from {url}");

        Ok(FetchOutcome::Fetched { etag: new_etag })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch_to(
        &self,
        url: &Url,
        etag: Option<&str>,
        dest: &Path,
    ) -> LoaderResult<FetchOutcome> {
        // Dropping the request future on timeout closes the socket.
        match tokio::time::timeout(self.timeout, self.fetch_inner(url, etag, dest)).await {
            Ok(result) => result,
            Err(_) => Err(LoaderError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }),
        }
    }
}
