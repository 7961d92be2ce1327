//! End-to-end tests of the delivery engine against a stub subscriber:
//! ordered at-least-once delivery, retry after failure, unsubscribe
//! mid-backlog.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use axum::Router;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::time::timeout;
use url::Url;

use p3sub::coding::{self, Timestamp};
use p3sub_pub::{Delivery, FeedIndex, Subscriptions};

// 2024-01-01T00:00:00.000000Z
const EPOCH_2024: u64 = 1_704_067_200;

const SUB_ID: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

#[derive(Debug)]
struct ReceivedPut {
    query: HashMap<String, String>,
    link: String,
    body: Vec<u8>,
}

#[derive(Clone)]
struct StubState {
    tx: mpsc::UnboundedSender<ReceivedPut>,
    fail_remaining: Arc<AtomicUsize>,
}

/// Records every PUT; answers 500 while `fail_remaining` is positive, 200
/// afterwards.
async fn stub_put(
    State(state): State<StubState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = query
        .as_deref()
        .map(coding::decode_query)
        .unwrap_or_default();
    let link = headers
        .get("link")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    state
        .tx
        .send(ReceivedPut {
            query,
            link,
            body: body.to_vec(),
        })
        .unwrap();

    if state.fail_remaining.load(Ordering::SeqCst) > 0 {
        state.fail_remaining.fetch_sub(1, Ordering::SeqCst);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else {
        StatusCode::OK.into_response()
    }
}

struct Harness {
    dir: tempfile::TempDir,
    feed: Arc<FeedIndex>,
    subs: Arc<Mutex<Subscriptions>>,
    wake: Arc<Notify>,
    rx: mpsc::UnboundedReceiver<ReceivedPut>,
    fail_remaining: Arc<AtomicUsize>,
    callback: Url,
    _shutdown: oneshot::Sender<()>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let feed = Arc::new(FeedIndex::new(dir.path()));
        let subs = Arc::new(Mutex::new(Subscriptions::new()));
        let wake = Arc::new(Notify::new());

        let (tx, rx) = mpsc::unbounded_channel();
        let fail_remaining = Arc::new(AtomicUsize::new(0));
        let stub = StubState {
            tx,
            fail_remaining: fail_remaining.clone(),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/cb", put(stub_put)).with_state(stub);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let delivery = Delivery::new(
            feed.clone(),
            subs.clone(),
            wake.clone(),
            Url::parse("http://pub.example/feed").unwrap(),
            Url::parse("http://pub.example/feed/unsub").unwrap(),
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(delivery.run(shutdown_rx));

        Self {
            dir,
            feed,
            subs,
            wake,
            rx,
            fail_remaining,
            callback: Url::parse(&format!("http://{addr}/cb")).unwrap(),
            _shutdown: shutdown_tx,
        }
    }

    fn write_element(&self, name: &str, contents: &[u8], offset_secs: u64) {
        let mut file = File::create(self.dir.path().join(name)).unwrap();
        file.write_all(contents).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(EPOCH_2024 + offset_secs))
            .unwrap();
        self.feed.invalidate();
    }

    async fn subscribe(&self, from: &str) {
        self.subs
            .lock()
            .await
            .add(SUB_ID.to_string(), self.callback.clone(), ts(from));
    }

    async fn next_put(&mut self) -> ReceivedPut {
        timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a PUT")
            .expect("stub channel closed")
    }

    async fn expect_no_put(&mut self) {
        assert!(
            timeout(Duration::from_millis(500), self.rx.recv())
                .await
                .is_err(),
            "expected no further PUT"
        );
    }

    async fn high_water_mark(&self) -> Timestamp {
        self.subs
            .lock()
            .await
            .get(SUB_ID)
            .expect("subscription gone")
            .last_successful_ts
    }

    /// The cycle commits high-water marks after the last PUT response, so
    /// give it a moment to finish.
    async fn wait_for_mark(&self, expected: Timestamp) {
        for _ in 0..100 {
            if self.high_water_mark().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("high-water mark never reached {expected}");
    }
}

#[tokio::test]
async fn delivers_one_new_element() {
    let mut harness = Harness::new().await;
    harness.subscribe("2024-01-01T00:00:00.000000Z").await;
    harness.write_element("new", b"fresh bytes", 5);
    harness.wake.notify_one();

    let put = harness.next_put().await;
    assert_eq!(put.query[coding::PARAM_TS], "2024-01-01T00:00:05.000000Z");
    assert_eq!(put.query[coding::PARAM_SUBID], SUB_ID);
    assert_eq!(put.body, b"fresh bytes");
    assert!(put.link.contains("rel=\"p3sub-unsubscribe\""));
    // no earlier element existed, so no prev link
    assert!(!put.link.contains("rel=\"prev\""));

    harness.expect_no_put().await;
    harness
        .wait_for_mark(ts("2024-01-01T00:00:05.000000Z"))
        .await;
}

#[tokio::test]
async fn delivers_backlog_in_order_with_prev_links() {
    let mut harness = Harness::new().await;
    harness.write_element("a", b"a", 5);
    harness.write_element("b", b"b", 10);
    harness.write_element("c", b"c", 15);
    harness.subscribe("2024-01-01T00:00:00.000000Z").await;
    harness.wake.notify_one();

    let first = harness.next_put().await;
    assert_eq!(first.query[coding::PARAM_TS], "2024-01-01T00:00:05.000000Z");
    assert!(!first.link.contains("rel=\"prev\""));

    let second = harness.next_put().await;
    assert_eq!(
        second.query[coding::PARAM_TS],
        "2024-01-01T00:00:10.000000Z"
    );
    assert!(second.link.contains("rel=\"prev\""));
    assert!(second
        .link
        .contains("p3sub-ts=2024-01-01T00%3A00%3A05.000000Z"));

    let third = harness.next_put().await;
    assert_eq!(third.query[coding::PARAM_TS], "2024-01-01T00:00:15.000000Z");
    assert!(third
        .link
        .contains("p3sub-ts=2024-01-01T00%3A00%3A10.000000Z"));

    harness.expect_no_put().await;
    harness
        .wait_for_mark(ts("2024-01-01T00:00:15.000000Z"))
        .await;
}

#[tokio::test]
async fn failed_put_is_retried_before_newer_elements() {
    let mut harness = Harness::new().await;
    harness.subscribe("2024-01-01T00:00:00.000000Z").await;
    harness.write_element("first", b"first", 5);
    harness.fail_remaining.store(1, Ordering::SeqCst);
    harness.wake.notify_one();

    // rejected with a 500; the mark must not move
    let put = harness.next_put().await;
    assert_eq!(put.query[coding::PARAM_TS], "2024-01-01T00:00:05.000000Z");
    harness.expect_no_put().await;
    assert_eq!(
        harness.high_water_mark().await,
        ts("2024-01-01T00:00:00.000000Z")
    );

    // a second element appears; the next cycle retries the first element
    // before sending the second
    harness.write_element("second", b"second", 10);
    harness.wake.notify_one();

    let retried = harness.next_put().await;
    assert_eq!(
        retried.query[coding::PARAM_TS],
        "2024-01-01T00:00:05.000000Z"
    );
    let second = harness.next_put().await;
    assert_eq!(
        second.query[coding::PARAM_TS],
        "2024-01-01T00:00:10.000000Z"
    );

    harness
        .wait_for_mark(ts("2024-01-01T00:00:10.000000Z"))
        .await;
}

#[tokio::test]
async fn unsubscribe_during_backlog_stops_delivery() {
    let mut harness = Harness::new().await;
    harness.write_element("a", b"a", 5);
    harness.write_element("b", b"b", 10);
    harness.write_element("c", b"c", 15);
    harness.subscribe("2024-01-01T00:00:00.000000Z").await;

    assert!(harness.subs.lock().await.remove(SUB_ID));
    harness.wake.notify_one();

    harness.expect_no_put().await;
    assert!(harness.subs.lock().await.is_empty());
}
