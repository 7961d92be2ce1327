use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use url::Url;

use p3sub::coding::Timestamp;
use p3sub::subid::MIN_SUBID_LEN;
use p3sub_sub::{PassiveSubscriber, SubscribingSubscriber};

/// Run a P3Sub subscriber.
#[derive(Parser, Clone)]
pub struct Cli {
    /// HTTP URL at which to listen for incoming feed elements.
    #[arg(long, default_value = "http://localhost:8946/")]
    pub listen: Url,

    /// Store received feed elements in this directory.
    #[arg(long, default_value = "received")]
    pub received_directory: PathBuf,

    /// URL of the feed to subscribe to.
    #[arg(required_unless_present = "subscription_id", conflicts_with = "subscription_id")]
    pub feed_url: Option<Url>,

    /// Use this existing subscription id; do not subscribe again.
    #[arg(long, alias = "subid")]
    pub subscription_id: Option<String>,

    /// Subscribe starting from this timestamp.
    #[arg(long, conflicts_with = "subscription_id", value_parser = Timestamp::parse)]
    pub from_ts: Option<Timestamp>,

    /// Subscribe in "diff" mode.
    #[arg(long, conflicts_with = "subscription_id")]
    pub diff: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Cap tracing so the hyper/reqwest internals don't flood the output.
    let tracer = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(tracer).unwrap();

    let cli = Cli::parse();

    if cli.listen.scheme() != "http" {
        anyhow::bail!("only http is supported for incoming feed elements");
    }
    if let Some(feed_url) = &cli.feed_url {
        if feed_url.scheme() != "http" && feed_url.scheme() != "https" {
            anyhow::bail!("only http and https are supported for feeds to subscribe to");
        }
    }
    if let Some(sub_id) = &cli.subscription_id {
        if sub_id.len() < MIN_SUBID_LEN {
            anyhow::bail!(
                "subscription id must have at least {} characters",
                MIN_SUBID_LEN
            );
        }
    }
    if cli.diff {
        log::warn!("diff mode is not implemented, receiving full elements");
    }

    if !cli.received_directory.is_dir() {
        std::fs::create_dir_all(&cli.received_directory).with_context(|| {
            format!("failed to create {}", cli.received_directory.display())
        })?;
    }

    match (cli.feed_url, cli.subscription_id) {
        (Some(feed_url), None) => {
            SubscribingSubscriber::new(cli.listen, cli.received_directory, feed_url, cli.from_ts)
                .run()
                .await
        }
        (None, Some(sub_id)) => {
            PassiveSubscriber::new(cli.listen, cli.received_directory, sub_id)
                .run()
                .await
        }
        _ => anyhow::bail!("specify a feed URL or --subscription-id, not both"),
    }
}
