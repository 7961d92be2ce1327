//! Wire protocol for P3Sub (Push-Pull-Publish-Subscribe).
//!
//! P3Sub turns a directory of files into a timestamp-ordered feed published
//! over HTTP and delivers new elements to subscribers via HTTP PUT
//! callbacks. This crate holds everything both sides agree on:
//!
//! - The query parameter names and link relations (see [`coding`])
//! - The timestamp wire format and its codec
//! - The link-header codec and the relative-URL resolution rules
//! - The query-string decoding rules
//! - Subscription id generation and the minimum accepted length
//!
//! The publisher and subscriber crates (`p3sub-pub`, `p3sub-sub`) build on
//! this; nothing here performs I/O.

pub mod coding;
pub mod subid;
