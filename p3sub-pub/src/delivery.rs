use std::sync::Arc;

use anyhow::Context;
use reqwest::StatusCode;
use tokio::sync::{oneshot, Mutex, Notify};
use url::Url;

use p3sub::coding::{self, Timestamp};

use crate::feed::{FeedElement, FeedIndex};
use crate::subscriptions::{Subscription, Subscriptions};

/// Fans new feed elements out to subscribers, one PUT at a time.
///
/// A single worker sleeps on a binary wake event and walks registry x feed
/// on every trigger. Per subscription, elements go out in ascending mtime
/// order and the high-water mark advances only after a 200; the first
/// failure parks that subscription until the next wake. Ordering across
/// subscriptions is unspecified.
pub struct Delivery {
    feed: Arc<FeedIndex>,
    subs: Arc<Mutex<Subscriptions>>,
    wake: Arc<Notify>,
    client: reqwest::Client,
    /// Absolute feed URL, used for `prev` links in outgoing PUTs.
    feed_url: Url,
    /// Absolute unsubscribe URL advertised with every PUT.
    unsub_url: Url,
}

impl Delivery {
    pub fn new(
        feed: Arc<FeedIndex>,
        subs: Arc<Mutex<Subscriptions>>,
        wake: Arc<Notify>,
        feed_url: Url,
        unsub_url: Url,
    ) -> Self {
        Self {
            feed,
            subs,
            wake,
            client: reqwest::Client::new(),
            feed_url,
            unsub_url,
        }
    }

    /// Runs until `shutdown` fires. Each wake processes one full cycle;
    /// triggers arriving mid-cycle collapse into the next one.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.wake.notified() => self.cycle().await,
                _ = &mut shutdown => break,
            }
        }
        log::debug!("delivery worker stopped");
    }

    /// One pass over all subscriptions.
    ///
    /// Holds the feed-and-subs lock for the whole pass, which serializes
    /// delivery against subscribe/unsubscribe. High-water marks are staged
    /// during the iteration and written back once it completes.
    async fn cycle(&self) {
        let mut subs = self.subs.lock().await;
        let mut advanced: Vec<(String, Timestamp)> = Vec::new();

        for (sub_id, sub) in subs.snapshot() {
            if let Some(new_ts) = self.deliver_pending(&sub_id, &sub).await {
                advanced.push((sub_id, new_ts));
            }
        }

        for (sub_id, ts) in advanced {
            subs.update(&sub_id, ts);
        }
    }

    /// Sends everything past the subscription's high-water mark. Returns
    /// the mark after the last successful PUT, if any advanced.
    async fn deliver_pending(&self, sub_id: &str, sub: &Subscription) -> Option<Timestamp> {
        let (mut prev, pending) = match self.feed.after(sub.last_successful_ts) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("cannot read feed directory: {}", err);
                return None;
            }
        };

        let mut new_ts = None;
        for element in pending {
            match self.put(sub_id, sub, prev.as_ref(), &element).await {
                Ok(()) => {
                    new_ts = Some(element.mtime);
                    prev = Some(element);
                }
                Err(err) => {
                    log::warn!(
                        "cannot reach {}, skipping this subscriber this round: {:#}",
                        sub.callback,
                        err
                    );
                    break;
                }
            }
        }

        new_ts
    }

    /// One PUT of one element. Success is HTTP status 200, exactly.
    async fn put(
        &self,
        sub_id: &str,
        sub: &Subscription,
        prev: Option<&FeedElement>,
        element: &FeedElement,
    ) -> anyhow::Result<()> {
        let body = tokio::fs::read(&element.path)
            .await
            .with_context(|| format!("failed to read {}", element.path.display()))?;

        let mut url = sub.callback.clone();
        url.query_pairs_mut()
            .append_pair(coding::PARAM_TS, &element.mtime.to_string())
            .append_pair(coding::PARAM_SUBID, sub_id);

        let mut link = coding::format_link(self.unsub_url.as_str(), coding::REL_UNSUBSCRIBE);
        if let Some(prev) = prev {
            link.push_str(", ");
            link.push_str(&coding::format_link(
                ts_url(&self.feed_url, prev.mtime).as_str(),
                coding::REL_PREV,
            ));
        }

        log::info!("sending element {} to {}", element.mtime, url);

        let response = self
            .client
            .put(url.clone())
            .header("content-type", "application/octet-stream")
            .header("link", link)
            .body(body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("unexpected status {} from {}", response.status(), url);
        }

        Ok(())
    }
}

/// The feed URL pinned to an exact element: `...?p3sub-ts=<ts>`.
fn ts_url(feed_url: &Url, ts: Timestamp) -> Url {
    let mut url = feed_url.clone();
    url.query_pairs_mut()
        .append_pair(coding::PARAM_TS, &ts.to_string());
    url
}
