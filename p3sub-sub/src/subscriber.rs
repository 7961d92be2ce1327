use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use reqwest::StatusCode;
use url::Url;

use p3sub::coding::{self, Timestamp};
use p3sub::subid;

use crate::listener::Listener;

/// Subscriber that performs the full lifecycle:
/// discover, subscribe, listen, unsubscribe.
pub struct SubscribingSubscriber {
    listen: Url,
    listener: Arc<Listener>,
    feed_url: Url,
    from_ts: Option<Timestamp>,
    client: reqwest::Client,
}

impl SubscribingSubscriber {
    pub fn new(
        listen: Url,
        received_directory: PathBuf,
        feed_url: Url,
        from_ts: Option<Timestamp>,
    ) -> Self {
        let listener = Arc::new(Listener::new(
            listen.path(),
            received_directory,
            subid::generate(),
            Some(feed_url.clone()),
        ));

        Self {
            listen,
            listener,
            feed_url,
            from_ts,
            client: reqwest::Client::new(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        self.subscribe().await?;
        run_listener(&self.listen, self.listener.clone()).await?;
        self.unsubscribe().await
    }

    /// Discovers the subscribe endpoint on the feed and registers the
    /// callback. Any non-200 or missing link rel aborts the lifecycle.
    async fn subscribe(&self) -> anyhow::Result<()> {
        let response = self
            .client
            .get(self.feed_url.clone())
            .send()
            .await
            .with_context(|| format!("cannot fetch feed {}", self.feed_url))?;
        if response.status() != StatusCode::OK {
            anyhow::bail!(
                "wrong status fetching {}: expected 200, was {}",
                self.feed_url,
                response.status()
            );
        }

        let rels = link_rels(response.headers());
        let Some(subscribe) = rels.get(coding::REL_SUBSCRIBE) else {
            anyhow::bail!(
                "not a P3Sub URI, no {} link header: {}",
                coding::REL_SUBSCRIBE,
                self.feed_url
            );
        };
        let subscribe_url = coding::resolve(&self.feed_url, subscribe)
            .with_context(|| format!("cannot resolve subscribe URI {subscribe}"))?;

        let mut form = vec![
            (coding::PARAM_SUBID, self.listener.sub_id().to_string()),
            (coding::PARAM_CALLBACK, self.listen.to_string()),
        ];
        if let Some(from_ts) = self.from_ts {
            form.push((coding::PARAM_TS, from_ts.to_string()));
        }

        log::info!("subscribing at {}", subscribe_url);

        let response = self
            .client
            .post(subscribe_url.clone())
            .form(&form)
            .send()
            .await
            .with_context(|| format!("cannot reach {subscribe_url}"))?;
        if response.status() != StatusCode::OK {
            anyhow::bail!("subscription failed, HTTP status {}", response.status());
        }

        let rels = link_rels(response.headers());
        match rels.get(coding::REL_UNSUBSCRIBE) {
            Some(unsub) => {
                let unsub_url = coding::resolve(&self.feed_url, unsub)
                    .with_context(|| format!("cannot resolve unsubscribe URI {unsub}"))?;
                self.listener.set_unsubscribe_url(unsub_url);
            }
            None => log::warn!("no unsubscribe link in subscription response"),
        }

        Ok(())
    }

    /// Cancels the subscription, if we ever learned the unsubscribe URI.
    async fn unsubscribe(&self) -> anyhow::Result<()> {
        let Some(unsub_url) = self.listener.unsubscribe_url() else {
            log::warn!("cannot unsubscribe, have no unsubscribe URI");
            return Ok(());
        };

        let response = self
            .client
            .post(unsub_url.clone())
            .form(&[(coding::PARAM_SUBID, self.listener.sub_id())])
            .send()
            .await
            .with_context(|| format!("cannot reach {unsub_url}"))?;
        if response.status() != StatusCode::OK {
            anyhow::bail!("unsubscription failed, HTTP status {}", response.status());
        }

        log::info!("unsubscribed");
        Ok(())
    }
}

/// Subscriber that only listens, with a pre-shared subscription id that
/// some out-of-band sender uses.
pub struct PassiveSubscriber {
    listen: Url,
    listener: Arc<Listener>,
}

impl PassiveSubscriber {
    pub fn new(listen: Url, received_directory: PathBuf, sub_id: String) -> Self {
        let listener = Arc::new(Listener::new(
            listen.path(),
            received_directory,
            sub_id,
            None,
        ));

        Self { listen, listener }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        run_listener(&self.listen, self.listener).await
    }
}

/// Serves the listener until interrupted.
async fn run_listener(listen: &Url, listener: Arc<Listener>) -> anyhow::Result<()> {
    let host = listen.host_str().context("listen URL must have a host")?;
    let port = listen.port().context("listen URL must have a port")?;
    let addr = format!("{host}:{port}");

    let app = listener.router();
    let tcp = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    log::info!("server started http://{addr}");

    axum::serve(tcp, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("interrupt received, shutting down");
        })
        .await
        .context("server error")?;

    log::info!("server stopped");
    Ok(())
}

fn link_rels(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    coding::parse_links(
        headers
            .get_all(reqwest::header::LINK)
            .iter()
            .filter_map(|value| value.to_str().ok()),
    )
}
