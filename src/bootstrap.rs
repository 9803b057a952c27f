use std::sync::Arc;
use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LOG_FILE_PREFIX, LOG_FILE_SUFFIX};
use crate::error::{AppError, AppResult};
use crate::recompute::TableDriver;
use crate::scheduler::{RecomputeScheduler, SchedulerConfig};
use crate::store::{MySqlStore, RecomputeStore};

fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug,sqlx=debug"
    } else {
        "info,sqlx=warn"
    }
}

/// `log.<date>.txt` under the log directory, rotated daily, keeping
/// `log.max_files` files
fn file_appender(config: &Config) -> AppResult<RollingFileAppender> {
    std::fs::create_dir_all(config.log_dir())?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(config.log_max_files())
        .build(config.log_dir())
        .map_err(|e| AppError::Config(format!("log file appender: {}", e)))
}

/// Console + daily rolling log file, filtered by `RUST_LOG` when set.
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process.
pub fn init_tracing(config: &Config) -> AppResult<WorkerGuard> {
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender(config)?);

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter(config.debug()).into());

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .map_err(|e| AppError::Config(format!("tracing already initialised: {}", e)))?;

    Ok(guard)
}

pub async fn initialize_database(config: &Config) -> AppResult<MySqlPool> {
    info!("📊 Connecting to database...");

    let url = config.database_url();
    if url.is_empty() {
        return Err(AppError::Config("database dsn is empty".to_string()));
    }

    let pool = MySqlPoolOptions::new()
        .max_connections(config.pool.max_connections)
        .min_connections(config.pool.min_connections)
        .max_lifetime(Duration::from_secs(config.pool.max_lifetime_secs))
        .idle_timeout(config.idle_timeout())
        .connect(&url)
        .await?;

    info!(
        "✓ Database pool configured: {} max / {} min connections",
        config.pool.max_connections, config.pool.min_connections
    );
    Ok(pool)
}

/// Wire the store, table driver and scheduler
pub async fn initialize_scheduler(config: &Config) -> AppResult<RecomputeScheduler> {
    let pool = initialize_database(config).await?;
    let store: Arc<dyn RecomputeStore> = Arc::new(MySqlStore::new(pool));

    let driver = Arc::new(TableDriver::new(store, config.batch_size(), config.debug()));

    let scheduler_config = SchedulerConfig {
        idle_interval: config.idle_interval(),
        table_pacing: config.table_pacing(),
        tables: SchedulerConfig::resolve_tables(&config.scheduler.tables),
    };
    if scheduler_config.tables.is_empty() {
        return Err(AppError::Config("no known tables configured".to_string()));
    }

    info!(
        "✅ Recompute pipeline ready for tables: {:?}",
        scheduler_config.tables.iter().map(|t| t.table).collect::<Vec<_>>()
    );

    Ok(RecomputeScheduler::new(scheduler_config, driver))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(true), "debug,sqlx=debug");
        assert_eq!(default_filter(false), "info,sqlx=warn");
    }

    #[test]
    fn test_file_appender_writes_dated_log_file() {
        use std::io::Write;

        let dir = std::env::temp_dir().join(format!("recompute-logs-{}", std::process::id()));
        let yaml = format!("dirs:\n  logs: {}\n", dir.display());
        let config = Config::from_yaml_str(&yaml).unwrap();

        let mut appender = file_appender(&config).unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("log.") && names[0].ends_with(".txt"), "{:?}", names);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
