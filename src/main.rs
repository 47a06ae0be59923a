use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snifferfy::config::{Configuration, LogFormat};
use snifferfy::server;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Configuration::parse();
    init_logging(&config);

    config.validate()?;
    info!(
        scanner = %config.scanner_addr(),
        dial_timeout_ms = config.dial_timeout_ms,
        io_timeout_ms = config.io_timeout_ms,
        max_upload_bytes = config.max_upload_bytes,
        max_reply_bytes = config.max_reply_bytes,
        "initialized snifferfy"
    );

    server::spawn_server(&config).await
}

fn init_logging(config: &Configuration) {
    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
