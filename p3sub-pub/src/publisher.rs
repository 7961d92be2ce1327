use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{oneshot, Mutex, Notify};
use url::Url;

use crate::delivery::Delivery;
use crate::feed::FeedIndex;
use crate::server::{self, ServerState};
use crate::subscriptions::Subscriptions;
use crate::watcher::FeedWatcher;

/// Configuration for the publisher.
pub struct PublisherConfig {
    /// Serve the feed at this http URL; its path becomes the feed path.
    pub listen: Url,
    /// Directory that holds the feed content. Created if missing.
    pub feed_directory: PathBuf,
}

/// P3Sub publisher: serves a directory of files as a timestamp-ordered
/// feed and pushes new elements to registered subscribers.
pub struct Publisher {
    listen_addr: String,
    state: ServerState,
    delivery: Delivery,
}

impl Publisher {
    pub fn new(config: PublisherConfig) -> anyhow::Result<Self> {
        if config.listen.scheme() != "http" {
            anyhow::bail!("only http is supported for serving the feed");
        }
        let host = config
            .listen
            .host_str()
            .context("listen URL must have a host")?;
        let port = config.listen.port().context("listen URL must have a port")?;
        let listen_addr = format!("{host}:{port}");

        let feed_path = config.listen.path().trim_end_matches('/').to_string();
        if feed_path.is_empty() {
            anyhow::bail!("listen URL must have a path, e.g. http://localhost:8945/feed");
        }
        let subscribe_path = format!("{feed_path}/sub");
        let unsubscribe_path = format!("{feed_path}/unsub");

        if !config.feed_directory.is_dir() {
            std::fs::create_dir_all(&config.feed_directory).with_context(|| {
                format!("failed to create {}", config.feed_directory.display())
            })?;
        }

        // Absolute URLs advertised in outgoing PUT link headers; responses
        // to GET/POST carry path-relative ones.
        let mut feed_url = config.listen.clone();
        feed_url.set_path(&feed_path);
        feed_url.set_query(None);
        let mut unsub_url = feed_url.clone();
        unsub_url.set_path(&unsubscribe_path);

        let feed = Arc::new(FeedIndex::new(&config.feed_directory));
        let subs = Arc::new(Mutex::new(Subscriptions::new()));
        let wake = Arc::new(Notify::new());

        let state = ServerState {
            feed: feed.clone(),
            subs: subs.clone(),
            wake: wake.clone(),
            feed_path,
            subscribe_path,
            unsubscribe_path,
        };

        let delivery = Delivery::new(feed, subs, wake, feed_url, unsub_url);

        Ok(Self {
            listen_addr,
            state,
            delivery,
        })
    }

    /// Serves until interrupted, then tears down watcher, delivery worker
    /// and server in that order. In-flight requests run to completion.
    pub async fn run(self) -> anyhow::Result<()> {
        let watcher = FeedWatcher::new(self.state.feed.clone(), self.state.wake.clone())?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = tokio::spawn(self.delivery.run(shutdown_rx));

        let app = server::router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.listen_addr))?;

        log::info!("server started http://{}", self.listen_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                log::info!("interrupt received, shutting down");
            })
            .await
            .context("server error")?;

        drop(watcher);
        let _ = shutdown_tx.send(());
        worker.await.context("delivery worker panicked")?;

        log::info!("server stopped");
        Ok(())
    }
}
