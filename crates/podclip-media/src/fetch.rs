//! Range-preserving audio fetcher.
//!
//! One engine serves two callers: the streaming proxy (client-facing
//! pass-through) and the extractor/analyzer (download to a temp file).
//! Redirects are walked manually so every hop passes the SSRF gate.

use std::io;
use std::path::Path;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Method, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::error::{MediaError, MediaResult};
use crate::ssrf;

/// First chunk relayed to a proxy client, sized for low first-byte latency.
pub const INITIAL_CHUNK_BYTES: usize = 8 * 1024;

/// Steady-state relay chunk size.
pub const STEADY_CHUNK_BYTES: usize = 32 * 1024;

/// Response headers relayed through the proxy verbatim.
pub const RELAY_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "content-range",
    "accept-ranges",
    "etag",
    "last-modified",
    "cache-control",
];

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// TCP connect (and TLS handshake) timeout
    pub connect_timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// Redirect hop budget
    pub max_redirects: usize,
    /// Hosts exempt from the private-address policy.
    ///
    /// Development escape hatch for fixtures served off loopback; empty in
    /// production.
    pub allow_private_hosts: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 10,
            max_redirects: 10,
            allow_private_hosts: Vec::new(),
        }
    }
}

/// An upstream response vetted by the SSRF policy.
pub struct Upstream {
    /// URL after redirects
    pub final_url: Url,
    /// Upstream status (200 or 206 for the success paths)
    pub status: StatusCode,
    response: reqwest::Response,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("final_url", &self.final_url)
            .field("status", &self.status)
            .finish()
    }
}

impl Upstream {
    /// Total body size, when the upstream declared one.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Headers the proxy relays to its client.
    pub fn relay_headers(&self) -> HeaderMap {
        let mut relayed = HeaderMap::new();
        for name in RELAY_HEADERS {
            if let Some(value) = self.response.headers().get(*name) {
                if let Ok(name) = reqwest::header::HeaderName::from_bytes(name.as_bytes()) {
                    relayed.insert(name, value.clone());
                }
            }
        }
        relayed
    }

    /// Body as a re-chunked byte stream: one small chunk up front so the
    /// client hears audio quickly, then steady larger chunks.
    pub fn into_chunked_stream(self) -> impl Stream<Item = Result<Bytes, io::Error>> {
        struct State {
            inner: std::pin::Pin<
                Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>,
            >,
            buf: BytesMut,
            sent_first: bool,
            done: bool,
        }

        let state = State {
            inner: Box::pin(self.response.bytes_stream()),
            buf: BytesMut::new(),
            sent_first: false,
            done: false,
        };

        stream::try_unfold(state, |mut state| async move {
            let target = if state.sent_first {
                STEADY_CHUNK_BYTES
            } else {
                INITIAL_CHUNK_BYTES
            };

            while !state.done && state.buf.len() < target {
                match state.inner.next().await {
                    Some(Ok(bytes)) => state.buf.extend_from_slice(&bytes),
                    Some(Err(e)) => return Err(io::Error::other(e)),
                    None => state.done = true,
                }
            }

            if state.buf.is_empty() {
                return Ok(None);
            }

            let take = state.buf.len().min(target);
            let chunk = state.buf.split_to(take).freeze();
            state.sent_first = true;
            Ok(Some((chunk, state)))
        })
    }
}

/// Shared HTTP engine for proxying and downloading audio.
#[derive(Debug, Clone)]
pub struct AudioFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl AudioFetcher {
    /// Build the fetcher and its pooled client.
    ///
    /// Redirects are disabled on the client; `open` walks them itself so
    /// each hop is re-validated.
    pub fn new(config: FetchConfig) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, config })
    }

    /// GET a URL, following redirects under the SSRF policy.
    ///
    /// `range` is the client's Range header, forwarded untouched so the
    /// upstream decides between 200 and 206.
    pub async fn open(&self, url: &str, range: Option<&str>) -> MediaResult<Upstream> {
        self.open_with_method(Method::GET, url, range).await
    }

    /// HEAD variant of [`open`](Self::open).
    pub async fn head(&self, url: &str, range: Option<&str>) -> MediaResult<Upstream> {
        self.open_with_method(Method::HEAD, url, range).await
    }

    fn host_exempt(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| {
                self.config
                    .allow_private_hosts
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(host))
            })
            .unwrap_or(false)
    }

    async fn check_hop(&self, url: &Url) -> MediaResult<()> {
        if self.host_exempt(url) {
            return Ok(());
        }
        ssrf::check_host(url)?;
        ssrf::ensure_public(url).await
    }

    async fn open_with_method(
        &self,
        method: Method,
        url: &str,
        range: Option<&str>,
    ) -> MediaResult<Upstream> {
        let mut current = ssrf::parse_url(url)?;

        for _hop in 0..=self.config.max_redirects {
            self.check_hop(&current).await?;

            let mut request = self.client.request(method.clone(), current.clone());
            if let Some(range) = range {
                if let Ok(value) = HeaderValue::from_str(range) {
                    request = request.header(RANGE, value);
                }
            }
            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        MediaError::download_failed("redirect without Location header")
                    })?;
                let next = current
                    .join(location)
                    .map_err(|e| MediaError::InvalidUrl(e.to_string()))?;
                debug!(from = %current, to = %next, "Following redirect");
                current = ssrf::parse_url(next.as_str())?;
                continue;
            }

            if status.as_u16() >= 400 {
                return Err(MediaError::UpstreamStatus {
                    status: status.as_u16(),
                });
            }

            // A portal or error page masquerading as audio.
            let is_html = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
                .unwrap_or(false);
            if is_html {
                return Err(MediaError::HtmlBody);
            }

            return Ok(Upstream {
                final_url: current,
                status,
                response,
            });
        }

        Err(MediaError::RedirectLoop)
    }

    /// Download a URL into `dest`, reporting `(received, total)` after each
    /// chunk. Cancellation is observed between chunks.
    pub async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        mut cancel: watch::Receiver<bool>,
        mut progress: impl FnMut(u64, Option<u64>),
    ) -> MediaResult<u64> {
        let upstream = self.open(url, None).await?;
        let total = upstream.content_length();
        let mut stream = std::pin::pin!(upstream.response.bytes_stream());

        let mut file = tokio::fs::File::create(dest).await?;
        let mut received: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_ok() && *cancel.borrow() {
                        drop(file);
                        if let Err(e) = tokio::fs::remove_file(dest).await {
                            warn!("Failed to remove partial download {}: {}", dest.display(), e);
                        }
                        return Err(MediaError::Cancelled);
                    }
                    // Sender gone or spurious wake: fall through to the body.
                    stream.next().await
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await?;
                    received += bytes.len() as u64;
                    progress(received, total);
                }
                Some(Err(e)) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(MediaError::Http(e));
                }
                None => break,
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        debug!(
            "Downloaded {} ({:.1} MB)",
            dest.display(),
            received as f64 / (1024.0 * 1024.0)
        );
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Wiremock binds loopback, which the policy would otherwise reject.
    fn fetcher() -> AudioFetcher {
        AudioFetcher::new(FetchConfig {
            allow_private_hosts: vec!["127.0.0.1".into()],
            ..Default::default()
        })
        .unwrap()
    }

    fn idle_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_private_urls_blocked_by_default() {
        let strict = AudioFetcher::new(FetchConfig::default()).unwrap();
        let result = strict.open("http://127.0.0.1/x.mp3", None).await;
        assert!(matches!(result, Err(MediaError::SsrfBlocked { .. })));
    }

    #[tokio::test]
    async fn test_open_relays_range_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ep.mp3"))
            .and(header("Range", "bytes=0-99"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Type", "audio/mpeg")
                    .insert_header("Content-Range", "bytes 0-99/1000")
                    .insert_header("Accept-Ranges", "bytes")
                    .set_body_bytes(vec![0u8; 100]),
            )
            .mount(&server)
            .await;

        let url = format!("{}/ep.mp3", server.uri());
        let upstream = fetcher().open(&url, Some("bytes=0-99")).await.unwrap();
        assert_eq!(upstream.status, StatusCode::PARTIAL_CONTENT);

        let relayed = upstream.relay_headers();
        assert_eq!(relayed.get("content-type").unwrap(), "audio/mpeg");
        assert_eq!(relayed.get("content-range").unwrap(), "bytes 0-99/1000");

        let body: Vec<u8> = upstream
            .into_chunked_stream()
            .map_ok(|b| b.to_vec())
            .try_concat()
            .await
            .unwrap();
        assert_eq!(body.len(), 100);
    }

    #[tokio::test]
    async fn test_open_rejects_html_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html; charset=utf-8")
                    .set_body_string("<html>captive portal</html>"),
            )
            .mount(&server)
            .await;

        let result = fetcher().open(&format!("{}/ep.mp3", server.uri()), None).await;
        assert!(matches!(result, Err(MediaError::HtmlBody)));
    }

    #[tokio::test]
    async fn test_open_surfaces_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = fetcher().open(&format!("{}/ep.mp3", server.uri()), None).await;
        match result {
            Err(MediaError::UpstreamStatus { status }) => assert_eq!(status, 503),
            other => panic!("expected UpstreamStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redirects_are_followed_and_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/hop"))
            .mount(&server)
            .await;

        let result = fetcher().open(&format!("{}/hop", server.uri()), None).await;
        assert!(matches!(result, Err(MediaError::RedirectLoop)));
    }

    #[tokio::test]
    async fn test_redirect_to_private_address_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leak"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "http://169.254.169.254/"),
            )
            .mount(&server)
            .await;

        let result = fetcher().open(&format!("{}/leak", server.uri()), None).await;
        assert!(matches!(result, Err(MediaError::SsrfBlocked { .. })));
    }

    #[tokio::test]
    async fn test_download_to_writes_file_and_reports_progress() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "audio/mpeg")
                    .set_body_bytes(body.clone()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ep.mp3");
        let mut last = 0u64;
        let written = fetcher()
            .download_to(
                &format!("{}/ep.mp3", server.uri()),
                &dest,
                idle_cancel(),
                |received, _total| last = received,
            )
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(last, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_chunked_stream_front_loads_first_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "audio/mpeg")
                    .set_body_bytes(vec![1u8; 100 * 1024]),
            )
            .mount(&server)
            .await;

        let upstream = fetcher()
            .open(&format!("{}/ep.mp3", server.uri()), None)
            .await
            .unwrap();
        let chunks: Vec<Bytes> = upstream
            .into_chunked_stream()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks[0].len(), INITIAL_CHUNK_BYTES);
        assert!(chunks[1..].iter().all(|c| c.len() <= STEADY_CHUNK_BYTES));
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 100 * 1024);
    }
}
