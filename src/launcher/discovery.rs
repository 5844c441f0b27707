//! HTTP discovery of a browser's debugging endpoint.
//!
//! A browser started with `--remote-debugging-port` serves its target list
//! at `GET /json`. Each page target carries the WebSocket URL a connection
//! is opened to.
//!
//! | Endpoint | Returns |
//! |----------|---------|
//! | `/json` | [`TargetDescriptor`] list |
//! | `/json/version` | [`BrowserVersion`] |

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Per-request HTTP timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(2);

/// Allowance for the last attempt on top of a policy's sleep budget.
const LAST_ATTEMPT_ALLOWANCE: Duration = Duration::from_millis(500);

/// Target type that can be connected to.
const PAGE_TYPE: &str = "page";

// ============================================================================
// Types
// ============================================================================

/// One entry of the `/json` target list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    /// Target id; some embedders omit it.
    #[serde(default)]
    pub id: String,

    /// Target type (`page`, `background_page`, `service_worker`, ...).
    #[serde(rename = "type")]
    pub target_type: String,

    /// Title.
    #[serde(default)]
    pub title: String,

    /// URL.
    #[serde(default)]
    pub url: String,

    /// WebSocket URL; absent while another client is attached.
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

impl TargetDescriptor {
    /// Returns `true` for page targets.
    #[inline]
    #[must_use]
    pub fn is_page(&self) -> bool {
        self.target_type == PAGE_TYPE
    }
}

/// The `/json/version` document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowserVersion {
    /// Product name and version.
    #[serde(rename = "Browser")]
    pub browser: String,

    /// Protocol version.
    #[serde(rename = "Protocol-Version")]
    pub protocol_version: String,

    /// User agent.
    #[serde(rename = "User-Agent", default)]
    pub user_agent: String,

    /// Browser-level WebSocket URL.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

// ============================================================================
// Discovery
// ============================================================================

/// Client for a browser's discovery endpoint.
#[derive(Debug, Clone)]
pub struct Discovery {
    client: reqwest::Client,
    base_url: String,
}

impl Discovery {
    /// Creates a client for `base_url`, e.g. `http://localhost:9222`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the target list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the endpoint is unreachable, answers with
    /// an error status, or the body is not a JSON array. Entries that do not
    /// decode are skipped.
    pub async fn targets(&self) -> Result<Vec<TargetDescriptor>> {
        let entries: Vec<Value> = self.get_json("/json").await?;

        let targets = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(target) => Some(target),
                Err(e) => {
                    debug!(error = %e, "Skipping undecodable target entry");
                    None
                }
            })
            .collect();

        Ok(targets)
    }

    /// Fetches browser version metadata.
    ///
    /// # Errors
    ///
    /// As [`Discovery::targets`].
    pub async fn version(&self) -> Result<BrowserVersion> {
        self.get_json("/json/version").await
    }

    /// Polls the target list until it is reachable, then returns the
    /// WebSocket URL of the first page target.
    ///
    /// # Errors
    ///
    /// The whole poll is bounded by the policy's sleep budget plus one
    /// attempt's allowance, so an endpoint that accepts but never answers
    /// cannot stretch it to `attempts × HTTP timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::DiscoveryTimeout`] if the endpoint never answered
    /// - [`Error::NoTarget`] if it answered without a connectable page
    pub async fn wait_for_page_endpoint(&self, policy: &RetryPolicy) -> Result<String> {
        let started = AtomicU32::new(0);
        let started = &started;

        let poll = policy.run(|attempt| async move {
            started.store(attempt, Ordering::Relaxed);
            let result = self.targets().await;
            if let Err(e) = &result {
                trace!(attempt, error = %e, "Discovery endpoint not ready");
            }
            result
        });

        let targets = match tokio::time::timeout(discovery_deadline(policy), poll).await {
            Ok(Ok(targets)) => targets,
            Ok(Err(exhausted)) => {
                debug!(url = %self.base_url, last_error = ?exhausted.last_error, "Discovery gave up");
                return Err(Error::discovery_timeout(&self.base_url, exhausted.attempts));
            }
            Err(_) => {
                let attempts = started.load(Ordering::Relaxed);
                debug!(url = %self.base_url, attempts, "Discovery deadline passed");
                return Err(Error::discovery_timeout(&self.base_url, attempts));
            }
        };

        let endpoint =
            select_page_endpoint(&targets).ok_or_else(|| Error::no_target(&self.base_url))?;

        info!(endpoint, "Browser listening");
        Ok(endpoint.to_string())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(body)
    }
}

/// Overall bound for [`Discovery::wait_for_page_endpoint`].
fn discovery_deadline(policy: &RetryPolicy) -> Duration {
    policy.budget() + policy.interval.max(LAST_ATTEMPT_ALLOWANCE)
}

/// Returns the WebSocket URL of the first page target that has one.
#[must_use]
pub fn select_page_endpoint(targets: &[TargetDescriptor]) -> Option<&str> {
    targets
        .iter()
        .filter(|target| target.is_page())
        .find_map(|target| target.web_socket_debugger_url.as_deref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `body` as JSON to every request until dropped.
    async fn serve_json(body: serde_json::Value) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (base, handle)
    }

    fn target(kind: &str, ws: Option<&str>) -> TargetDescriptor {
        TargetDescriptor {
            id: "T".to_string(),
            target_type: kind.to_string(),
            title: String::new(),
            url: String::new(),
            web_socket_debugger_url: ws.map(ToString::to_string),
        }
    }

    #[test]
    fn test_select_first_page() {
        let targets = [
            target("service_worker", Some("ws://sw")),
            target("page", None),
            target("page", Some("ws://page-1")),
            target("page", Some("ws://page-2")),
        ];
        assert_eq!(select_page_endpoint(&targets), Some("ws://page-1"));
        assert_eq!(select_page_endpoint(&targets[..2]), None);
    }

    #[test]
    fn test_descriptor_parse() {
        let descriptor: TargetDescriptor = serde_json::from_value(json!({
            "description": "",
            "devtoolsFrontendUrl": "/devtools/inspector.html?ws=localhost:9222/devtools/page/ABC",
            "id": "ABC",
            "title": "about:blank",
            "type": "page",
            "url": "about:blank",
            "webSocketDebuggerUrl": "ws://localhost:9222/devtools/page/ABC"
        }))
        .expect("parse");

        assert!(descriptor.is_page());
        assert_eq!(
            descriptor.web_socket_debugger_url.as_deref(),
            Some("ws://localhost:9222/devtools/page/ABC")
        );
    }

    #[tokio::test]
    async fn test_wait_for_page_endpoint() {
        let (base, server) = serve_json(json!([
            {"id": "B", "type": "background_page", "webSocketDebuggerUrl": "ws://x/bg"},
            {"id": "P", "type": "page", "webSocketDebuggerUrl": "ws://x/devtools/page/P"}
        ]))
        .await;

        let discovery = Discovery::new(format!("{base}/")).expect("client");
        assert_eq!(discovery.base_url(), base);

        let endpoint = discovery
            .wait_for_page_endpoint(&RetryPolicy::new(5, Duration::from_millis(10)))
            .await
            .expect("endpoint");
        assert_eq!(endpoint, "ws://x/devtools/page/P");

        server.abort();
    }

    #[tokio::test]
    async fn test_no_page_is_no_target() {
        let (base, server) =
            serve_json(json!([{"id": "W", "type": "service_worker", "url": ""}])).await;

        let err = Discovery::new(base)
            .expect("client")
            .wait_for_page_endpoint(&RetryPolicy::new(3, Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoTarget { .. }));

        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_is_discovery_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        drop(listener);

        let err = Discovery::new(base)
            .expect("client")
            .wait_for_page_endpoint(&RetryPolicy::new(3, Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DiscoveryTimeout { attempts: 3, .. }));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_minimal_page_entry() {
        let (base, server) = serve_json(json!([
            {"type": "page", "webSocketDebuggerUrl": "ws://x/devtools/page/P"}
        ]))
        .await;

        let endpoint = Discovery::new(base)
            .expect("client")
            .wait_for_page_endpoint(&RetryPolicy::new(3, Duration::from_millis(10)))
            .await;
        assert_eq!(endpoint.ok().as_deref(), Some("ws://x/devtools/page/P"));

        server.abort();
    }

    #[tokio::test]
    async fn test_undecodable_entries_are_skipped() {
        let (base, server) = serve_json(json!([
            {"id": 7, "type": "page", "webSocketDebuggerUrl": "ws://x/bad"},
            "not a target",
            {"id": "P", "type": "page", "webSocketDebuggerUrl": "ws://x/good"}
        ]))
        .await;

        let targets = Discovery::new(base).expect("client").targets().await.expect("targets");
        assert_eq!(targets.len(), 1);
        assert_eq!(select_page_endpoint(&targets), Some("ws://x/good"));

        server.abort();
    }

    #[tokio::test]
    async fn test_silent_endpoint_respects_budget() {
        // Accepts connections and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let started = std::time::Instant::now();
        let err = Discovery::new(base)
            .expect("client")
            .wait_for_page_endpoint(&RetryPolicy::new(3, Duration::from_millis(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DiscoveryTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());

        server.abort();
    }

    #[test]
    fn test_discovery_deadline() {
        let default = discovery_deadline(&RetryPolicy::discovery());
        assert!(default >= Duration::from_secs(10) && default < Duration::from_secs(11));

        let single = discovery_deadline(&RetryPolicy::new(1, Duration::from_millis(10)));
        assert_eq!(single, LAST_ATTEMPT_ALLOWANCE);
    }

    #[tokio::test]
    async fn test_version() {
        let (base, server) = serve_json(json!({
            "Browser": "HeadlessChrome/120.0.6099.0",
            "Protocol-Version": "1.3",
            "User-Agent": "Mozilla/5.0",
            "webSocketDebuggerUrl": "ws://localhost:9222/devtools/browser/X"
        }))
        .await;

        let version = Discovery::new(base).expect("client").version().await.expect("version");
        assert_eq!(version.protocol_version, "1.3");
        assert!(version.browser.starts_with("HeadlessChrome"));

        server.abort();
    }
}
