//! P3Sub publisher library.
//!
//! The publisher turns a directory of files into a timestamp-ordered feed
//! served over HTTP and pushes new elements to registered subscribers via
//! HTTP PUT callbacks. The pieces:
//!
//! - [`FeedIndex`]: lazily cached ordered view of the feed directory
//! - [`Subscriptions`]: in-memory registry of subscribers
//! - [`Delivery`]: the worker that fans new elements out, in order
//! - [`FeedWatcher`]: invalidates the index and wakes the worker on change
//! - the axum server in [`server`] and the [`Publisher`] tying it together

mod delivery;
mod feed;
mod publisher;
pub mod server;
mod subscriptions;
mod watcher;

pub use delivery::*;
pub use feed::*;
pub use publisher::*;
pub use subscriptions::*;
pub use watcher::*;
