//! Blob retrieval from the remote content store.
//!
//! [`ContentFetcher`] wraps a [`BlobStore`] and a [`RateLimit`] policy. Each
//! call issues exactly one request, then pauses according to the policy,
//! whether the request succeeded or not. Failures are reported on stderr and
//! surface as `None`; nothing is retried.
//!
//! The default store is [`GithubBlobStore`], which calls the GitHub REST
//! "get a blob" endpoint:
//!
//! ```text
//! GET {base_url}/repos/{owner}/{repo}/git/blobs/{sha}
//! → {"sha": "...", "encoding": "base64", "content": "ZGVm...\n..."}
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

use crate::config::RemoteConfig;

/// A content-addressed file archive.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the decoded text of `content_id` in `repository`.
    async fn fetch_blob(&self, repository: &str, content_id: &str) -> Result<String>;
}

/// Pacing applied after every request to the remote store.
#[async_trait]
pub trait RateLimit: Send + Sync {
    async fn pause(&self);
}

/// Sleep for a fixed interval after each request.
pub struct FixedDelay(pub Duration);

#[async_trait]
impl RateLimit for FixedDelay {
    async fn pause(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}

/// No pacing at all.
pub struct NoDelay;

#[async_trait]
impl RateLimit for NoDelay {
    async fn pause(&self) {}
}

/// Rate-limited, non-raising access to a [`BlobStore`].
pub struct ContentFetcher {
    store: Box<dyn BlobStore>,
    limiter: Box<dyn RateLimit>,
}

impl ContentFetcher {
    pub fn new(store: Box<dyn BlobStore>, limiter: Box<dyn RateLimit>) -> Self {
        Self { store, limiter }
    }

    /// Build a fetcher for the GitHub store described by `remote`.
    pub fn from_config(remote: &RemoteConfig) -> Result<Self> {
        let store = GithubBlobStore::new(remote)?;
        Ok(Self::new(
            Box::new(store),
            Box::new(FixedDelay(remote.delay())),
        ))
    }

    /// Fetch one blob, returning `None` (after logging) on any failure.
    pub async fn fetch(&self, repository: &str, content_id: &str) -> Option<String> {
        let result = self.store.fetch_blob(repository, content_id).await;
        self.limiter.pause().await;
        match result {
            Ok(text) => Some(text),
            Err(e) => {
                eprintln!(
                    "Warning: failed to fetch blob {} from {}: {:#}",
                    content_id, repository, e
                );
                None
            }
        }
    }
}

/// Blob store backed by the GitHub REST API.
pub struct GithubBlobStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubBlobStore {
    pub fn new(remote: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(remote.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            token: remote.resolve_token(),
        })
    }

    fn blob_url(&self, repository: &str, content_id: &str) -> String {
        format!(
            "{}/repos/{}/git/blobs/{}",
            self.base_url,
            repository.trim_matches('/'),
            content_id
        )
    }
}

#[derive(Deserialize)]
struct BlobResponse {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[async_trait]
impl BlobStore for GithubBlobStore {
    async fn fetch_blob(&self, repository: &str, content_id: &str) -> Result<String> {
        let url = self.blob_url(repository, content_id);

        let mut req = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "blob request failed (HTTP {}): {}",
                status,
                body.chars().take(200).collect::<String>()
            );
        }

        let blob: BlobResponse = resp
            .json()
            .await
            .with_context(|| format!("invalid blob response from {}", url))?;
        decode_blob(&blob)
    }
}

fn decode_blob(blob: &BlobResponse) -> Result<String> {
    match blob.encoding.as_deref() {
        None | Some("base64") => {}
        Some(other) => bail!("unsupported blob encoding '{}'", other),
    }
    decode_base64_text(&blob.content)
}

/// Decode base64 text that may be wrapped across lines into UTF-8.
pub fn decode_base64_text(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .context("blob content is not valid base64")?;
    String::from_utf8(bytes).context("blob content is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingStore;

    #[async_trait]
    impl BlobStore for FailingStore {
        async fn fetch_blob(&self, _repository: &str, _content_id: &str) -> Result<String> {
            bail!("HTTP 404")
        }
    }

    struct EchoStore;

    #[async_trait]
    impl BlobStore for EchoStore {
        async fn fetch_blob(&self, repository: &str, content_id: &str) -> Result<String> {
            Ok(format!("{}@{}", repository, content_id))
        }
    }

    struct CountingLimit(Arc<AtomicUsize>);

    #[async_trait]
    impl RateLimit for CountingLimit {
        async fn pause(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn decodes_wrapped_base64() {
        // "def f():\n    return 1\n" split the way GitHub wraps content.
        let encoded = "ZGVmIGYoKToKICAgIHJl\ndHVybiAxCg==\n";
        assert_eq!(
            decode_base64_text(encoded).unwrap(),
            "def f():\n    return 1\n"
        );
    }

    #[test]
    fn rejects_bad_base64_and_bad_utf8() {
        assert!(decode_base64_text("not base64!!").is_err());
        // 0xFF 0xFE is not UTF-8.
        assert!(decode_base64_text("//4=").is_err());
    }

    #[test]
    fn rejects_unknown_encoding() {
        let blob = BlobResponse {
            content: "abc".to_string(),
            encoding: Some("utf-8".to_string()),
        };
        assert!(decode_blob(&blob).is_err());
    }

    #[test]
    fn blob_url_shape() {
        let remote = RemoteConfig {
            base_url: "http://127.0.0.1:9000/".to_string(),
            ..RemoteConfig::default()
        };
        let store = GithubBlobStore::new(&remote).unwrap();
        assert_eq!(
            store.blob_url("acme/widgets", "abc123"),
            "http://127.0.0.1:9000/repos/acme/widgets/git/blobs/abc123"
        );
    }

    #[tokio::test]
    async fn failure_is_none_and_still_pauses() {
        let pauses = Arc::new(AtomicUsize::new(0));
        let fetcher = ContentFetcher::new(
            Box::new(FailingStore),
            Box::new(CountingLimit(pauses.clone())),
        );
        assert_eq!(fetcher.fetch("acme/widgets", "abc").await, None);
        assert_eq!(pauses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_pauses_once_per_call() {
        let pauses = Arc::new(AtomicUsize::new(0));
        let fetcher = ContentFetcher::new(
            Box::new(EchoStore),
            Box::new(CountingLimit(pauses.clone())),
        );
        assert_eq!(
            fetcher.fetch("acme/widgets", "abc").await.as_deref(),
            Some("acme/widgets@abc")
        );
        fetcher.fetch("acme/widgets", "def").await;
        assert_eq!(pauses.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fixed_delay_waits_full_interval() {
        let start = std::time::Instant::now();
        FixedDelay(Duration::from_millis(30)).pause().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
