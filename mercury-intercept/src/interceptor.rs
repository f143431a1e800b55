//! Feed interceptor.
//!
//! Consumes the exchanges a [`PageTap`] publishes, keeps the ones whose
//! content type marks them as feed traffic, retrieves their bodies
//! concurrently and hands every decoded frame to the fleet cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use mercury_cache::{FleetCache, IngestSummary};
use mercury_core::constants::{EXCHANGE_CHANNEL_CAPACITY, FEED_MIME_TYPE};
use mercury_core::error::{MercuryError, Result};
use mercury_core::traits::PageTap;
use mercury_core::types::{Exchange, ResponseBody};
use mercury_feed::parse_frame;

/// Interceptor configuration.
#[derive(Clone, Debug)]
pub struct InterceptorConfig {
    /// Content type that marks an exchange as feed traffic
    pub mime_type: String,
    /// Capacity of the exchange channel between tap and interceptor
    pub channel_capacity: usize,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            mime_type: FEED_MIME_TYPE.into(),
            channel_capacity: EXCHANGE_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Default)]
struct InterceptorCounters {
    exchanges_seen: AtomicU64,
    exchanges_relevant: AtomicU64,
    transport_misses: AtomicU64,
    fetch_failures: AtomicU64,
    encoding_failures: AtomicU64,
    frames_ingested: AtomicU64,
    frames_without_data: AtomicU64,
}

/// Interceptor statistics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct InterceptorStats {
    pub exchanges_seen: u64,
    pub exchanges_relevant: u64,
    pub transport_misses: u64,
    pub fetch_failures: u64,
    pub encoding_failures: u64,
    pub frames_ingested: u64,
    pub frames_without_data: u64,
}

/// Undoes the outer transport encoding of a captured body.
pub fn decode_body(body: &ResponseBody) -> Result<Vec<u8>> {
    if body.base64_encoded {
        STANDARD
            .decode(body.body.as_bytes())
            .map_err(|e| MercuryError::InvalidBodyEncoding(e.to_string()))
    } else {
        Ok(body.body.as_bytes().to_vec())
    }
}

/// Parses one frame and upserts its locations into `cache`.
///
/// Fails with `NoLocations` when nothing in the frame was usable.
pub fn ingest_frame(cache: &FleetCache, frame: &[u8]) -> Result<IngestSummary> {
    let parsed = parse_frame(frame)?;
    Ok(cache.ingest(parsed.records))
}

/// Drives a page tap and feeds the fleet cache.
pub struct FeedInterceptor {
    tap: Arc<dyn PageTap>,
    cache: Arc<FleetCache>,
    config: InterceptorConfig,
    counters: Arc<InterceptorCounters>,
}

impl FeedInterceptor {
    /// Creates an interceptor with default configuration.
    pub fn new(tap: Arc<dyn PageTap>, cache: Arc<FleetCache>) -> Self {
        Self::with_config(tap, cache, InterceptorConfig::default())
    }

    /// Creates an interceptor with custom configuration.
    pub fn with_config(
        tap: Arc<dyn PageTap>,
        cache: Arc<FleetCache>,
        config: InterceptorConfig,
    ) -> Self {
        Self {
            tap,
            cache,
            config,
            counters: Arc::new(InterceptorCounters::default()),
        }
    }

    /// Taps `source_url` until `cancel` fires or the tap gives up.
    ///
    /// On return the producer has stopped, the channel is closed and the
    /// tap released. Body retrievals already in flight may still finish and
    /// ingest once more.
    pub async fn run(&self, source_url: &Url, cancel: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let producer = {
            let tap = Arc::clone(&self.tap);
            let url = source_url.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { tap.open(&url, tx, cancel).await })
        };
        info!(url = %source_url, "Feed interceptor started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                exchange = rx.recv() => match exchange {
                    Some(exchange) => self.dispatch(exchange),
                    None => break,
                },
            }
        }

        // The producer may still be setting up a connection; close after it stops.
        drop(rx);
        let outcome = match producer.await {
            Ok(result) => result,
            Err(e) => Err(MercuryError::InternalError(format!("page tap task failed: {}", e))),
        };
        self.tap.close().await;

        match &outcome {
            Ok(()) => info!("Feed interceptor stopped"),
            Err(e) => error!(error = %e, "Feed interceptor stopped on tap failure"),
        }
        outcome
    }

    /// Filters one exchange and retrieves its body on a separate task.
    fn dispatch(&self, exchange: Exchange) {
        self.counters.exchanges_seen.fetch_add(1, Ordering::Relaxed);
        if !exchange.matches_mime(&self.config.mime_type) {
            trace!(url = %exchange.url, mime = %exchange.mime_type, "Ignoring exchange");
            return;
        }
        self.counters.exchanges_relevant.fetch_add(1, Ordering::Relaxed);

        let tap = Arc::clone(&self.tap);
        let cache = Arc::clone(&self.cache);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            let body = match tap.fetch_body(&exchange.request_id).await {
                Ok(body) => body,
                Err(e) if e.is_transport_miss() => {
                    counters.transport_misses.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, request_id = %exchange.request_id, "Body retrieval failed");
                    counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            };
            debug!(url = %exchange.url, "Captured data");

            let frame = match decode_body(&body) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, "Failed to decode base64 body");
                    counters.encoding_failures.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            };

            match ingest_frame(&cache, &frame) {
                Ok(summary) => {
                    counters.frames_ingested.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        inserted = summary.inserted,
                        refreshed = summary.refreshed,
                        "Bus locations updated"
                    );
                }
                Err(e) => {
                    counters.frames_without_data.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %e, "Skipping frame (likely not location data or empty)");
                }
            }
        });
    }

    /// Returns interceptor statistics.
    pub fn stats(&self) -> InterceptorStats {
        let c = &self.counters;
        InterceptorStats {
            exchanges_seen: c.exchanges_seen.load(Ordering::Relaxed),
            exchanges_relevant: c.exchanges_relevant.load(Ordering::Relaxed),
            transport_misses: c.transport_misses.load(Ordering::Relaxed),
            fetch_failures: c.fetch_failures.load(Ordering::Relaxed),
            encoding_failures: c.encoding_failures.load(Ordering::Relaxed),
            frames_ingested: c.frames_ingested.load(Ordering::Relaxed),
            frames_without_data: c.frames_without_data.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn location_frame(bus_ids: &[&str]) -> String {
        let locations: Vec<String> = bus_ids
            .iter()
            .map(|id| format!("D|{}|08:00|5|In|54.15|-4.48|2026-01-11T03:55:00Z|1|x", id))
            .collect();
        let envelope = serde_json::json!({
            "type": 1,
            "target": "updateLocations",
            "arguments": [{ "locations": locations }],
        });
        format!("{}\u{1e}{{\"type\":6}}\u{1e}", envelope)
    }

    /// Publishes canned exchanges, then idles until cancelled.
    ///
    /// Request ids starting with `broken` fail to fetch with a non-miss error.
    struct ScriptedTap {
        exchanges: Vec<Exchange>,
        bodies: Mutex<HashMap<String, ResponseBody>>,
        closed: AtomicBool,
        open_returned: AtomicBool,
        closed_while_open: AtomicBool,
        fail_open: bool,
        teardown: Duration,
    }

    impl ScriptedTap {
        fn new(script: Vec<(Exchange, Option<ResponseBody>)>) -> Self {
            let mut bodies = HashMap::new();
            let mut exchanges = Vec::new();
            for (exchange, body) in script {
                if let Some(body) = body {
                    bodies.insert(exchange.request_id.clone(), body);
                }
                exchanges.push(exchange);
            }
            Self {
                exchanges,
                bodies: Mutex::new(bodies),
                closed: AtomicBool::new(false),
                open_returned: AtomicBool::new(false),
                closed_while_open: AtomicBool::new(false),
                fail_open: false,
                teardown: Duration::ZERO,
            }
        }

        async fn publish(&self, tx: mpsc::Sender<Exchange>, cancel: CancellationToken) -> Result<()> {
            if self.fail_open {
                return Err(MercuryError::NegotiationFailed("scripted".into()));
            }
            for exchange in &self.exchanges {
                if tx.send(exchange.clone()).await.is_err() {
                    return Ok(());
                }
            }
            cancel.cancelled().await;
            tokio::time::sleep(self.teardown).await;
            Ok(())
        }
    }

    #[async_trait]
    impl PageTap for ScriptedTap {
        async fn open(
            &self,
            _url: &Url,
            tx: mpsc::Sender<Exchange>,
            cancel: CancellationToken,
        ) -> Result<()> {
            let result = self.publish(tx, cancel).await;
            self.open_returned.store(true, Ordering::SeqCst);
            result
        }

        async fn fetch_body(&self, request_id: &str) -> Result<ResponseBody> {
            if request_id.starts_with("broken") {
                return Err(MercuryError::HttpError("connection reset".into()));
            }
            self.bodies
                .lock()
                .remove(request_id)
                .ok_or_else(|| MercuryError::BodyUnavailable(request_id.into()))
        }

        async fn close(&self) {
            if !self.open_returned.load(Ordering::SeqCst) {
                self.closed_while_open.store(true, Ordering::SeqCst);
            }
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn feed_url() -> Url {
        Url::parse("https://feed.test/hub").unwrap()
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_decode_body_plain_and_base64() {
        assert_eq!(decode_body(&ResponseBody::text("abc")).unwrap(), b"abc");
        assert_eq!(
            decode_body(&ResponseBody::base64(STANDARD.encode(b"\x1eabc"))).unwrap(),
            b"\x1eabc"
        );
        assert!(matches!(
            decode_body(&ResponseBody::base64("!!not base64!!")),
            Err(MercuryError::InvalidBodyEncoding(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_frame() {
        let cache = FleetCache::new();
        let summary = ingest_frame(&cache, location_frame(&["B1", "B2"]).as_bytes()).unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(cache.len(), 2);

        let err = ingest_frame(&cache, b"{\"type\":6}\x1e").unwrap_err();
        assert!(matches!(err, MercuryError::NoLocations { sub_messages: 1, issues: 0 }));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_run_feeds_cache_until_cancelled() {
        let tap = Arc::new(ScriptedTap::new(vec![
            (
                Exchange::new("1", "https://feed.test/hub?id=t", "application/octet-stream"),
                Some(ResponseBody::text(location_frame(&["B1"]))),
            ),
            (
                Exchange::new("2", "https://feed.test/app.js", "application/javascript"),
                Some(ResponseBody::text(location_frame(&["IGNORED"]))),
            ),
            (
                Exchange::new("3", "https://feed.test/hub?id=t", "Application/Octet-Stream"),
                Some(ResponseBody::base64(STANDARD.encode(location_frame(&["B2", "B3"])))),
            ),
            // Body already discarded upstream
            (Exchange::new("4", "https://feed.test/hub?id=t", "application/octet-stream"), None),
            (
                Exchange::new("5", "https://feed.test/hub?id=t", "application/octet-stream"),
                Some(ResponseBody::base64("%%%")),
            ),
            (
                Exchange::new("6", "https://feed.test/hub?id=t", "application/octet-stream"),
                Some(ResponseBody::text("{\"type\":6}\u{1e}")),
            ),
            (Exchange::new("broken-7", "https://feed.test/hub?id=t", "application/octet-stream"), None),
        ]));
        let cache = Arc::new(FleetCache::new());
        let interceptor = Arc::new(FeedInterceptor::new(tap.clone(), cache.clone()));
        let cancel = CancellationToken::new();

        let handle = {
            let interceptor = interceptor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { interceptor.run(&feed_url(), cancel).await })
        };

        wait_for(|| {
            let s = interceptor.stats();
            s.frames_ingested
                + s.frames_without_data
                + s.transport_misses
                + s.fetch_failures
                + s.encoding_failures
                == 6
        })
        .await;

        let mut ids: Vec<String> = cache.snapshot().into_iter().map(|r| r.bus_id).collect();
        ids.sort();
        assert_eq!(ids, ["B1", "B2", "B3"]);

        let stats = interceptor.stats();
        assert_eq!(stats.exchanges_seen, 7);
        assert_eq!(stats.exchanges_relevant, 6);
        assert_eq!(stats.frames_ingested, 2);
        assert_eq!(stats.transport_misses, 1);
        assert_eq!(stats.fetch_failures, 1);
        assert_eq!(stats.encoding_failures, 1);
        assert_eq!(stats.frames_without_data, 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(tap.closed.load(Ordering::SeqCst));
        assert!(!tap.closed_while_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_tap_closed_only_after_producer_stops() {
        let mut tap = ScriptedTap::new(vec![]);
        tap.teardown = Duration::from_millis(50);
        let tap = Arc::new(tap);

        let interceptor = FeedInterceptor::new(tap.clone(), Arc::new(FleetCache::new()));
        let cancel = CancellationToken::new();
        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        interceptor.run(&feed_url(), cancel).await.unwrap();
        trigger.await.unwrap();

        assert!(tap.open_returned.load(Ordering::SeqCst));
        assert!(tap.closed.load(Ordering::SeqCst));
        assert!(!tap.closed_while_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_run_reports_tap_failure_and_releases_tap() {
        let mut tap = ScriptedTap::new(vec![]);
        tap.fail_open = true;
        let tap = Arc::new(tap);

        let interceptor = FeedInterceptor::new(tap.clone(), Arc::new(FleetCache::new()));
        let err = interceptor
            .run(&feed_url(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MercuryError::NegotiationFailed(_)));
        assert!(tap.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_run_returns_promptly_when_already_cancelled() {
        let tap = Arc::new(ScriptedTap::new(vec![]));
        let interceptor = FeedInterceptor::new(tap.clone(), Arc::new(FleetCache::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        interceptor.run(&feed_url(), cancel).await.unwrap();
        assert!(tap.closed.load(Ordering::SeqCst));
    }
}
