use std::collections::HashMap;

use p3sub::coding::Timestamp;
use url::Url;

/// One registered subscriber.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Where new elements are PUT.
    pub callback: Url,
    /// High-water mark of delivery: the element with exactly this mtime has
    /// been acknowledged; anything strictly newer is pending.
    pub last_successful_ts: Timestamp,
}

/// In-memory registry of subscriptions, keyed by subscription id.
///
/// Lives behind the publisher's feed-and-subs lock; the delivery cycle
/// holds that lock end to end, so high-water-mark updates are linearizable
/// per subscription.
#[derive(Debug, Default)]
pub struct Subscriptions {
    entries: HashMap<String, Subscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a subscription starting from `from_ts`.
    pub fn add(&mut self, sub_id: String, callback: Url, from_ts: Timestamp) {
        self.entries.insert(
            sub_id,
            Subscription {
                callback,
                last_successful_ts: from_ts,
            },
        );
        self.log_entries();
    }

    /// Removes a subscription. Returns false if the id was unknown.
    pub fn remove(&mut self, sub_id: &str) -> bool {
        let removed = self.entries.remove(sub_id).is_some();
        if removed {
            self.log_entries();
        }
        removed
    }

    /// Advances the high-water mark. A no-op if the subscription was
    /// removed in the meantime or the mark would move backwards.
    pub fn update(&mut self, sub_id: &str, ts: Timestamp) {
        if let Some(sub) = self.entries.get_mut(sub_id) {
            if ts > sub.last_successful_ts {
                sub.last_successful_ts = ts;
            }
        }
    }

    pub fn get(&self, sub_id: &str) -> Option<&Subscription> {
        self.entries.get(sub_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consistent copy for one delivery cycle.
    pub fn snapshot(&self) -> Vec<(String, Subscription)> {
        self.entries
            .iter()
            .map(|(id, sub)| (id.clone(), sub.clone()))
            .collect()
    }

    fn log_entries(&self) {
        log::info!("subscriptions now: {}", self.entries.len());
        for (id, sub) in &self.entries {
            log::info!(
                "    {}: {} (last success: {})",
                id,
                sub.callback,
                sub.last_successful_ts
            );
        }
    }
}
