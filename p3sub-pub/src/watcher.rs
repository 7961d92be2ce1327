use std::sync::Arc;

use anyhow::Context;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Notify;

use crate::feed::FeedIndex;

/// Watches the feed directory and turns every filesystem event into an
/// index invalidation plus a delivery wake.
///
/// The wake is level-triggered "there may be work": events coalesce into
/// the binary wake and the delivery worker re-reads the world each cycle.
/// Dropping the watcher stops the watch.
pub struct FeedWatcher {
    _watcher: RecommendedWatcher,
}

impl FeedWatcher {
    pub fn new(feed: Arc<FeedIndex>, wake: Arc<Notify>) -> anyhow::Result<Self> {
        let dir = feed.directory().to_path_buf();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    log::debug!("feed directory changed: {:?}", event.kind);
                    feed.invalidate();
                    wake.notify_one();
                }
                Err(err) => log::warn!("feed directory watch error: {}", err),
            }
        })
        .context("failed to create feed directory watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;

        log::info!("watching feed directory {}", dir.display());

        Ok(Self { _watcher: watcher })
    }
}
