//! The publisher's HTTP surface: GET feed, POST subscribe, POST
//! unsubscribe. Everything else is a 400.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::{Mutex, Notify};
use tokio_util::io::ReaderStream;
use url::Url;

use p3sub::coding::{self, Timestamp};
use p3sub::subid::MIN_SUBID_LEN;

use crate::feed::FeedIndex;
use crate::subscriptions::Subscriptions;

/// Shared context for the publisher's request handlers.
#[derive(Clone)]
pub struct ServerState {
    pub feed: Arc<FeedIndex>,
    pub subs: Arc<Mutex<Subscriptions>>,
    pub wake: Arc<Notify>,
    pub feed_path: String,
    pub subscribe_path: String,
    pub unsubscribe_path: String,
}

/// Builds the publisher router over the three paths derived from the
/// listen URL's path.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route(&state.feed_path, get(get_feed).fallback(fallback))
        .route(&state.subscribe_path, post(post_subscribe).fallback(fallback))
        .route(
            &state.unsubscribe_path,
            post(post_unsubscribe).fallback(fallback),
        )
        .fallback(fallback)
        .with_state(state)
}

/// Internal handler failure: rendered in the shape clients expect and
/// logged so the server's own output captures it.
pub struct ServerError(anyhow::Error);

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        log::error!("cannot serve request: {:#}", self.0);
        (
            StatusCode::BAD_REQUEST,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("ERROR: Cannot serve this request.\n{}\n", self.0),
        )
            .into_response()
    }
}

/// Request-validation rejection: the client's fault, no state changed.
fn bad_request(reason: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "text/plain")],
        reason,
    )
        .into_response()
}

async fn get_feed(
    State(state): State<ServerState>,
    RawQuery(query): RawQuery,
) -> Result<Response, ServerError> {
    let query = query
        .as_deref()
        .map(coding::decode_query)
        .unwrap_or_default();

    let window = match query.get(coding::PARAM_TS) {
        Some(raw) => {
            let ts = match Timestamp::parse(raw) {
                Ok(ts) => ts,
                Err(err) => return Ok(bad_request(format!("{err}\n"))),
            };
            state.feed.at(ts)?
        }
        None => state.feed.current()?,
    };

    let Some((prev, element, next)) = window else {
        return Ok((
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain")],
            "No such element.\n",
        )
            .into_response());
    };

    // One link header line per relation.
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    append_link(
        &mut headers,
        &ts_path(&state.feed_path, element.mtime),
        coding::REL_CANONICAL,
    )?;
    append_link(&mut headers, &state.subscribe_path, coding::REL_SUBSCRIBE)?;
    if let Some(prev) = prev {
        append_link(
            &mut headers,
            &ts_path(&state.feed_path, prev.mtime),
            coding::REL_PREV,
        )?;
    }
    if let Some(next) = next {
        append_link(
            &mut headers,
            &ts_path(&state.feed_path, next.mtime),
            coding::REL_NEXT,
        )?;
    }

    let file = tokio::fs::File::open(&element.path).await?;
    let body = Body::from_stream(ReaderStream::with_capacity(file, 1024));

    Ok((StatusCode::OK, headers, body).into_response())
}

async fn post_subscribe(
    State(state): State<ServerState>,
    body: String,
) -> Result<Response, ServerError> {
    let form = coding::decode_form(&body);

    let sub_id = match single(&form, coding::PARAM_SUBID, "subscribe") {
        Ok(value) => value,
        Err(reason) => return Ok(bad_request(reason)),
    };
    if sub_id.len() < MIN_SUBID_LEN {
        return Ok(bad_request(format!(
            "Parameter {} must have a value of at least {} characters\n",
            coding::PARAM_SUBID,
            MIN_SUBID_LEN
        )));
    }

    let callback = match single(&form, coding::PARAM_CALLBACK, "subscribe") {
        Ok(value) => value,
        Err(reason) => return Ok(bad_request(reason)),
    };
    let callback = match Url::parse(callback) {
        Ok(url) => url,
        Err(_) => return Ok(bad_request(format!("Not a valid callback URI: {callback}\n"))),
    };

    let from_ts = match form.get(coding::PARAM_TS).map(Vec::as_slice) {
        None | Some([]) => Timestamp::now(),
        Some([raw]) => match Timestamp::parse(raw) {
            Ok(ts) => ts,
            Err(err) => return Ok(bad_request(format!("{err}\n"))),
        },
        Some(_) => {
            return Ok(bad_request(format!(
                "Too many {} in POSTed data for subscribe request\n",
                coding::PARAM_TS
            )))
        }
    };

    log::info!("subscribe: {} -> {}", sub_id, callback);

    {
        let mut subs = state.subs.lock().await;
        subs.add(sub_id.to_string(), callback, from_ts);
    }
    state.wake.notify_one();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    append_link(&mut headers, &state.unsubscribe_path, coding::REL_UNSUBSCRIBE)?;

    Ok((StatusCode::OK, headers, "Subscription successful.\n").into_response())
}

async fn post_unsubscribe(
    State(state): State<ServerState>,
    body: String,
) -> Result<Response, ServerError> {
    let form = coding::decode_form(&body);

    let sub_id = match single(&form, coding::PARAM_SUBID, "unsubscribe") {
        Ok(value) => value,
        Err(reason) => return Ok(bad_request(reason)),
    };

    let removed = {
        let mut subs = state.subs.lock().await;
        subs.remove(sub_id)
    };
    if !removed {
        return Ok(bad_request(format!(
            "No subscription found with {}={}.\n",
            coding::PARAM_SUBID,
            sub_id
        )));
    }

    log::info!("unsubscribe: {}", sub_id);

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    append_link(&mut headers, &state.subscribe_path, coding::REL_SUBSCRIBE)?;

    Ok((StatusCode::OK, headers, "Unsubscription successful.\n").into_response())
}

async fn fallback() -> Response {
    bad_request("Cannot handle this request.\n".to_string())
}

/// Extracts a field that must appear exactly once.
fn single<'f>(
    form: &'f HashMap<String, Vec<String>>,
    name: &str,
    request: &str,
) -> Result<&'f str, String> {
    match form.get(name).map(Vec::as_slice) {
        None | Some([]) => Err(format!("No {name} in POSTed data for {request} request\n")),
        Some([value]) => Ok(value),
        Some(_) => Err(format!(
            "Too many {name} in POSTed data for {request} request\n"
        )),
    }
}

fn append_link(headers: &mut HeaderMap, url: &str, rel: &str) -> Result<(), ServerError> {
    let value = HeaderValue::from_str(&coding::format_link(url, rel))?;
    headers.append(header::LINK, value);
    Ok(())
}

/// The feed path pinned to an exact element: `<feedPath>?p3sub-ts=<ts>`.
/// Timestamps go out verbatim, not percent-encoded.
fn ts_path(feed_path: &str, ts: Timestamp) -> String {
    format!("{}?{}={}", feed_path, coding::PARAM_TS, ts)
}
