mod bootstrap;
mod config;
mod error;
mod recompute;
mod scheduler;
mod schema;
mod store;

use anyhow::Context;
use tracing::info;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config_path = std::env::var("RECOMPUTE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("load config {}", config_path))?;
    config.validate().context("invalid config")?;

    // Dropping the guard stops the log file writer
    let _log_guard = bootstrap::init_tracing(&config).context("init logging")?;

    info!(
        "🚀 start recompute batch_size={} mode={} debug={}",
        config.batch_size(),
        config.mode,
        config.debug()
    );

    schema::validate_registry().context("schema registry")?;

    let scheduler = bootstrap::initialize_scheduler(&config)
        .await
        .context("initialize recompute scheduler")?;

    // The scheduler never finishes on its own
    scheduler.start().await.context("recompute scheduler stopped")?;

    Ok(())
}
