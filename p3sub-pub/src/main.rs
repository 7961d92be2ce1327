use std::path::PathBuf;

use clap::Parser;
use url::Url;

use p3sub_pub::{Publisher, PublisherConfig};

/// Run a P3Sub publisher.
#[derive(Parser, Clone)]
pub struct Cli {
    /// HTTP URL at which to serve the feed.
    #[arg(long, default_value = "http://localhost:8945/feed")]
    pub listen: Url,

    /// Directory that holds the feed content.
    #[arg(long, default_value = "feed")]
    pub feed_directory: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Cap tracing so the hyper/axum internals don't flood the output.
    let tracer = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(tracer).unwrap();

    let cli = Cli::parse();

    let publisher = Publisher::new(PublisherConfig {
        listen: cli.listen,
        feed_directory: cli.feed_directory,
    })?;

    publisher.run().await
}
