use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use axum::Router;
use url::Url;

use p3sub::coding::{self, Timestamp};

/// The PUT-listening core shared by both subscriber modes.
///
/// Validates incoming feed elements and persists accepted bodies to the
/// received directory as `<timestamp>.dat`. The unsubscribe URI advertised
/// by the publisher is refreshed on every accepted request.
pub struct Listener {
    listen_path: String,
    received_dir: PathBuf,
    sub_id: String,
    /// Feed URI for `prev` link validation; passive listeners have none.
    feed_url: Option<Url>,
    unsub_url: Mutex<Option<Url>>,
}

impl Listener {
    pub fn new(
        listen_path: &str,
        received_dir: impl AsRef<Path>,
        sub_id: String,
        feed_url: Option<Url>,
    ) -> Self {
        Self {
            listen_path: listen_path.to_string(),
            received_dir: received_dir.as_ref().to_path_buf(),
            sub_id,
            feed_url,
            unsub_url: Mutex::new(None),
        }
    }

    pub fn sub_id(&self) -> &str {
        &self.sub_id
    }

    /// The most recently advertised unsubscribe URI, if any.
    pub fn unsubscribe_url(&self) -> Option<Url> {
        self.unsub_url.lock().unwrap().clone()
    }

    /// Seeds the unsubscribe URI from the subscribe response; later PUTs
    /// keep it fresh.
    pub fn set_unsubscribe_url(&self, url: Url) {
        *self.unsub_url.lock().unwrap() = Some(url);
    }

    /// Router accepting `PUT <listenPath>`; every other request is a 400.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(&self.listen_path, put(receive_element).fallback(fallback))
            .fallback(fallback)
            .with_state(self.clone())
    }

    /// Validates one incoming PUT and stores its body. Returns the element
    /// timestamp on success, the rejection reason otherwise.
    async fn accept(
        &self,
        query: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Timestamp, String> {
        let query = query.map(coding::decode_query).unwrap_or_default();
        let rels = coding::parse_links(
            headers
                .get_all(header::LINK)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );

        let Some(raw_ts) = query.get(coding::PARAM_TS) else {
            return Err(format!("No {} in URL query\n", coding::PARAM_TS));
        };
        let ts = Timestamp::parse(raw_ts).map_err(|err| format!("{err}\n"))?;

        match query.get(coding::PARAM_SUBID) {
            None => return Err(format!("No {} in URL query\n", coding::PARAM_SUBID)),
            Some(sub_id) if *sub_id != self.sub_id => {
                return Err(format!(
                    "Wrong {} in URL query: {}\n",
                    coding::PARAM_SUBID,
                    sub_id
                ));
            }
            Some(_) => {}
        }

        // The prev link, when present, must point back into the feed we
        // subscribed to. String prefix match.
        if let (Some(prev), Some(feed_url)) = (rels.get(coding::REL_PREV), &self.feed_url) {
            if !prev.starts_with(feed_url.as_str()) {
                return Err(format!(
                    "Wrong {} in link header: {}\n",
                    coding::REL_PREV,
                    prev
                ));
            }
        }

        let Some(unsub) = rels.get(coding::REL_UNSUBSCRIBE) else {
            return Err(format!("No {} in link header\n", coding::REL_UNSUBSCRIBE));
        };
        let unsub_url = self
            .resolve(unsub)
            .map_err(|err| format!("Cannot parse {} URI: {err}\n", coding::REL_UNSUBSCRIBE))?;
        *self.unsub_url.lock().unwrap() = Some(unsub_url);

        let target = self.received_dir.join(format!("{ts}.dat"));
        tokio::fs::write(&target, body)
            .await
            .map_err(|err| format!("Cannot store element: {err}\n"))?;

        log::debug!("stored {}", target.display());
        Ok(ts)
    }

    fn resolve(&self, raw: &str) -> Result<Url, url::ParseError> {
        match &self.feed_url {
            Some(base) => coding::resolve(base, raw),
            None => Url::parse(raw),
        }
    }
}

async fn receive_element(
    State(listener): State<Arc<Listener>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match listener.accept(query.as_deref(), &headers, &body).await {
        Ok(ts) => {
            log::info!("received element {}", ts);
            (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], "OK").into_response()
        }
        Err(reason) => {
            log::info!("rejecting element: {}", reason.trim_end());
            (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, "text/plain")],
                reason,
            )
                .into_response()
        }
    }
}

async fn fallback() -> Response {
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "text/plain")],
        "Cannot handle this request.\n",
    )
        .into_response()
}
