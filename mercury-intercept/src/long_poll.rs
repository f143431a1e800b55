//! Long-polling page tap.
//!
//! Speaks the feed's long-polling transport directly: negotiate a
//! connection token, send the JSON protocol handshake, then poll. Each poll
//! response is published as an exchange and its body parked in a bounded
//! store until the interceptor asks for it.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use mercury_core::constants::HANDSHAKE_MESSAGE;
use mercury_core::error::{MercuryError, Result};
use mercury_core::traits::PageTap;
use mercury_core::types::{Exchange, ResponseBody};

use crate::body_store::BodyStore;

/// Long-polling tap configuration.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LongPollConfig {
    /// Upper bound on one poll, in seconds
    pub poll_timeout_seconds: u64,
    /// Timeout for negotiate, handshake and close requests, in seconds
    pub request_timeout_seconds: u64,
    /// Pause before reconnecting after a recoverable failure, in seconds
    pub reconnect_delay_seconds: u64,
    /// Bodies kept for retrieval before the oldest is discarded
    pub body_retention: usize,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            poll_timeout_seconds: 120,
            request_timeout_seconds: 30,
            reconnect_delay_seconds: 5,
            body_retention: 64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    #[serde(default)]
    connection_token: Option<String>,
    #[serde(default)]
    connection_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// An open feed connection.
#[derive(Clone, Debug)]
struct Connection {
    poll_url: Url,
}

enum PollEnd {
    Cancelled,
    ReceiverClosed,
}

/// Page tap over the long-polling transport.
pub struct LongPollTap {
    config: LongPollConfig,
    http_client: reqwest::Client,
    bodies: BodyStore,
    connection: Mutex<Option<Connection>>,
}

impl LongPollTap {
    /// Creates a tap with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(LongPollConfig::default())
    }

    /// Creates a tap with custom configuration.
    pub fn with_config(config: LongPollConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| MercuryError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            bodies: BodyStore::new(config.body_retention),
            config,
            http_client,
            connection: Mutex::new(None),
        })
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_seconds)
    }

    /// Obtains a connection token and builds the poll URL.
    #[instrument(skip_all, fields(url = %url))]
    async fn negotiate(&self, url: &Url) -> Result<Connection> {
        let mut negotiate_url = url.clone();
        negotiate_url
            .path_segments_mut()
            .map_err(|_| MercuryError::ValidationError(format!("cannot-be-a-base URL: {}", url)))?
            .pop_if_empty()
            .push("negotiate");
        negotiate_url.set_query(Some("negotiateVersion=1"));

        let response = self
            .http_client
            .post(negotiate_url)
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MercuryError::UpstreamStatus {
                status: status.as_u16(),
                reason: "negotiate rejected".into(),
            });
        }

        let negotiated: NegotiateResponse = response.json().await.map_err(map_reqwest)?;
        if let Some(error) = negotiated.error {
            return Err(MercuryError::NegotiationFailed(error));
        }
        let token = negotiated
            .connection_token
            .or(negotiated.connection_id)
            .ok_or_else(|| MercuryError::NegotiationFailed("no connection token".into()))?;

        let mut poll_url = url.clone();
        poll_url.query_pairs_mut().append_pair("id", &token);

        debug!("Negotiated feed connection");
        Ok(Connection { poll_url })
    }

    async fn handshake(&self, connection: &Connection) -> Result<()> {
        let response = self
            .http_client
            .post(connection.poll_url.clone())
            .timeout(self.request_timeout())
            .body(HANDSHAKE_MESSAGE)
            .send()
            .await
            .map_err(map_reqwest)?;

        if !response.status().is_success() {
            return Err(MercuryError::UpstreamStatus {
                status: response.status().as_u16(),
                reason: "handshake rejected".into(),
            });
        }
        Ok(())
    }

    async fn poll_loop(
        &self,
        connection: &Connection,
        tx: &mpsc::Sender<Exchange>,
        cancel: &CancellationToken,
    ) -> Result<PollEnd> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(PollEnd::Cancelled),
            handshake = self.handshake(connection) => handshake?,
        }
        info!("Feed connection established");

        loop {
            let request = self
                .http_client
                .get(connection.poll_url.clone())
                .timeout(Duration::from_secs(self.config.poll_timeout_seconds))
                .send();

            let response = tokio::select! {
                _ = cancel.cancelled() => return Ok(PollEnd::Cancelled),
                response = request => response.map_err(map_reqwest)?,
            };

            let status = response.status();
            if status == StatusCode::NO_CONTENT {
                return Err(MercuryError::UpstreamStatus {
                    status: status.as_u16(),
                    reason: "connection closed by upstream".into(),
                });
            }
            if !status.is_success() {
                return Err(MercuryError::UpstreamStatus {
                    status: status.as_u16(),
                    reason: "poll rejected".into(),
                });
            }

            let mime_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let url = response.url().to_string();
            let body = response.bytes().await.map_err(map_reqwest)?;
            if body.is_empty() {
                continue;
            }

            let request_id = Uuid::new_v4().to_string();
            self.bodies.insert(request_id.clone(), body);

            let exchange = Exchange::new(request_id, url, mime_type);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(PollEnd::Cancelled),
                sent = tx.send(exchange) => {
                    if sent.is_err() {
                        return Ok(PollEnd::ReceiverClosed);
                    }
                }
            }
        }
    }

    /// Drops the current connection, telling the upstream when there is one.
    async fn release(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            let result = self
                .http_client
                .delete(connection.poll_url)
                .timeout(self.request_timeout())
                .send()
                .await;
            if let Err(e) = result {
                debug!(error = %e, "Feed connection close request failed");
            }
        }
    }

    /// Sleeps before reconnecting. Returns true if cancelled meanwhile.
    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(Duration::from_secs(self.config.reconnect_delay_seconds)) => false,
        }
    }
}

#[async_trait]
impl PageTap for LongPollTap {
    async fn open(
        &self,
        url: &Url,
        tx: mpsc::Sender<Exchange>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let negotiated = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                negotiated = self.negotiate(url) => negotiated,
            };
            let connection = match negotiated {
                Ok(connection) => connection,
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Feed negotiation failed, retrying");
                    if self.backoff(&cancel).await {
                        return Ok(());
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            *self.connection.lock() = Some(connection.clone());

            match self.poll_loop(&connection, &tx, &cancel).await {
                Ok(PollEnd::Cancelled) | Ok(PollEnd::ReceiverClosed) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Feed connection lost, reconnecting");
                    self.release().await;
                    if self.backoff(&cancel).await {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_body(&self, request_id: &str) -> Result<ResponseBody> {
        let body = self
            .bodies
            .take(request_id)
            .ok_or_else(|| MercuryError::BodyUnavailable(request_id.to_string()))?;

        Ok(match String::from_utf8(body.to_vec()) {
            Ok(text) => ResponseBody::text(text),
            Err(_) => ResponseBody::base64(STANDARD.encode(&body)),
        })
    }

    async fn close(&self) {
        self.bodies.clear();
        self.release().await;
        info!("Feed tap closed");
    }
}

fn map_reqwest(err: reqwest::Error) -> MercuryError {
    if err.is_timeout() {
        MercuryError::ConnectionTimeout(err.to_string())
    } else if err.is_decode() {
        MercuryError::NegotiationFailed(err.to_string())
    } else {
        MercuryError::HttpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use bytes::Bytes;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use mercury_cache::FleetCache;

    use crate::interceptor::FeedInterceptor;

    const FRAME: &str = "{\"type\":1,\"target\":\"updateLocations\",\"arguments\":[{\"locations\":[\"D1|B1|T1|R1|Dir1|54.1|-4.5|2026-01-11T03:55:00Z|1|E1\"]}]}\u{1e}";

    fn negotiate_response() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "negotiateVersion": 1,
            "connectionId": "cid",
            "connectionToken": "tok",
            "availableTransports": [],
        }))
    }

    fn frame_response() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(FRAME.as_bytes().to_vec(), "application/octet-stream")
    }

    async fn mount_connect(server: &MockServer, negotiate: ResponseTemplate, handshake: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/hub/negotiate"))
            .respond_with(negotiate)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/hub"))
            .and(query_param("id", "tok"))
            .respond_with(handshake)
            .mount(server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/hub"))
            .respond_with(ResponseTemplate::new(202))
            .mount(server)
            .await;
    }

    async fn mount_polls(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/hub"))
            .and(query_param("id", "tok"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn mount_feed(server: &MockServer) {
        mount_connect(server, negotiate_response(), ResponseTemplate::new(200)).await;
        mount_polls(server, frame_response()).await;
    }

    /// Requests seen by the mock upstream, as "METHOD /path".
    async fn upstream_log(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| format!("{} {}", r.method, r.url.path()))
            .collect()
    }

    fn count(log: &[String], request: &str) -> usize {
        log.iter().filter(|r| r.as_str() == request).count()
    }

    fn spawn_open(
        tap: &Arc<LongPollTap>,
        url: Url,
        tx: mpsc::Sender<Exchange>,
        cancel: &CancellationToken,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let tap = tap.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { tap.open(&url, tx, cancel).await })
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        });
    }

    fn hub_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/hub", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_negotiate_uses_connection_token() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let tap = LongPollTap::new().unwrap();
        let connection = tap.negotiate(&hub_url(&server)).await.unwrap();
        assert_eq!(connection.poll_url.query(), Some("id=tok"));
        assert_eq!(connection.poll_url.path(), "/hub");
    }

    #[tokio::test]
    async fn test_negotiate_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hub/negotiate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "error": "hub disabled" })),
            )
            .mount(&server)
            .await;

        let tap = LongPollTap::new().unwrap();
        let err = tap.negotiate(&hub_url(&server)).await.unwrap_err();
        assert!(matches!(err, MercuryError::NegotiationFailed(ref m) if m == "hub disabled"));
    }

    #[tokio::test]
    async fn test_negotiate_status_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hub/negotiate"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tap = LongPollTap::new().unwrap();
        let err = tap.negotiate(&hub_url(&server)).await.unwrap_err();
        assert!(matches!(err, MercuryError::UpstreamStatus { status: 503, .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_open_publishes_exchanges() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let tap = Arc::new(LongPollTap::new().unwrap());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = spawn_open(&tap, hub_url(&server), tx, &cancel);

        let exchange = rx.recv().await.unwrap();
        assert!(exchange.matches_mime("application/octet-stream"));

        let body = tap.fetch_body(&exchange.request_id).await.unwrap();
        assert!(!body.base64_encoded);
        assert_eq!(body.body, FRAME);

        // A body is handed out once
        assert!(tap.fetch_body(&exchange.request_id).await.unwrap_err().is_transport_miss());

        cancel.cancel();
        handle.await.unwrap().unwrap();
        tap.close().await;
    }

    #[tokio::test]
    async fn test_binary_body_is_base64_flagged() {
        let tap = LongPollTap::new().unwrap();
        tap.bodies.insert("bin", Bytes::from_static(&[0xff, 0x00, 0x1e]));

        let body = tap.fetch_body("bin").await.unwrap();
        assert!(body.base64_encoded);
        assert_eq!(STANDARD.decode(body.body).unwrap(), vec![0xff, 0x00, 0x1e]);
    }

    #[tokio::test]
    async fn test_close_discards_pending_bodies() {
        let tap = LongPollTap::new().unwrap();
        tap.bodies.insert("a", Bytes::from_static(b"frame"));
        tap.close().await;
        assert!(matches!(
            tap.fetch_body("a").await,
            Err(MercuryError::BodyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_close_sends_delete_for_connection() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let tap = Arc::new(LongPollTap::new().unwrap());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = spawn_open(&tap, hub_url(&server), tx, &cancel);

        rx.recv().await.unwrap();
        cancel.cancel();
        handle.await.unwrap().unwrap();
        tap.close().await;

        let deletes: Vec<Url> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.as_str() == "DELETE")
            .map(|r| r.url)
            .collect();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].path(), "/hub");
        assert_eq!(deletes[0].query(), Some("id=tok"));
        assert!(tap.connection.lock().is_none());
    }

    #[tokio::test]
    async fn test_reconnects_after_upstream_closes_connection() {
        let server = MockServer::start().await;
        mount_connect(&server, negotiate_response(), ResponseTemplate::new(200)).await;
        Mock::given(method("GET"))
            .and(path("/hub"))
            .respond_with(ResponseTemplate::new(204))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_polls(&server, frame_response()).await;

        let tap = Arc::new(
            LongPollTap::with_config(LongPollConfig {
                reconnect_delay_seconds: 0,
                ..LongPollConfig::default()
            })
            .unwrap(),
        );
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = spawn_open(&tap, hub_url(&server), tx, &cancel);

        let exchange = rx.recv().await.unwrap();
        assert_eq!(tap.fetch_body(&exchange.request_id).await.unwrap().body, FRAME);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        tap.close().await;

        let log = upstream_log(&server).await;
        assert_eq!(count(&log, "POST /hub/negotiate"), 2);
        assert_eq!(count(&log, "POST /hub"), 2);
    }

    #[tokio::test]
    async fn test_evicted_body_is_a_transport_miss() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let tap = Arc::new(
            LongPollTap::with_config(LongPollConfig {
                body_retention: 1,
                ..LongPollConfig::default()
            })
            .unwrap(),
        );
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = spawn_open(&tap, hub_url(&server), tx, &cancel);

        // The second body is stored before the second exchange is published
        let first = rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        let err = tap.fetch_body(&first.request_id).await.unwrap_err();
        assert!(err.is_transport_miss());
        assert!(matches!(err, MercuryError::BodyUnavailable(_)));

        cancel.cancel();
        handle.await.unwrap().unwrap();
        tap.close().await;
    }

    #[tokio::test]
    async fn test_cancel_during_negotiation_abandons_connection() {
        let server = MockServer::start().await;
        mount_connect(
            &server,
            negotiate_response().set_delay(Duration::from_millis(800)),
            ResponseTemplate::new(200),
        )
        .await;
        mount_polls(&server, frame_response()).await;

        let tap: Arc<LongPollTap> = Arc::new(LongPollTap::new().unwrap());
        let interceptor = FeedInterceptor::new(tap.clone(), Arc::new(FleetCache::new()));
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(100));

        let started = Instant::now();
        interceptor.run(&hub_url(&server), cancel).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(600));

        let log = upstream_log(&server).await;
        assert_eq!(count(&log, "POST /hub"), 0);
        assert_eq!(count(&log, "GET /hub"), 0);
        assert!(tap.connection.lock().is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_handshake_still_closes_connection() {
        let server = MockServer::start().await;
        mount_connect(
            &server,
            negotiate_response(),
            ResponseTemplate::new(200).set_delay(Duration::from_millis(800)),
        )
        .await;
        mount_polls(&server, frame_response()).await;

        let tap: Arc<LongPollTap> = Arc::new(LongPollTap::new().unwrap());
        let interceptor = FeedInterceptor::new(tap.clone(), Arc::new(FleetCache::new()));
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(100));

        let started = Instant::now();
        interceptor.run(&hub_url(&server), cancel).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(600));

        let log = upstream_log(&server).await;
        assert_eq!(count(&log, "GET /hub"), 0);
        assert_eq!(count(&log, "DELETE /hub"), 1);
        assert!(tap.connection.lock().is_none());
    }
}
