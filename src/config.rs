use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use ::config::{Environment, File, FileFormat};

use crate::error::{AppError, AppResult};

pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Rolled files are named `log.<yyyy-mm-dd>.txt`
pub const LOG_FILE_PREFIX: &str = "log";
pub const LOG_FILE_SUFFIX: &str = "txt";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub mode: String,
    /// Values <= 0 fall back to `DEFAULT_BATCH_SIZE`
    #[serde(default)]
    pub recompute_batch_size: i64,
    /// 1 turns on debug logging and SQL tracing
    #[serde(default)]
    pub isdebug: i64,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dirs: DirsConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub development: DatabaseTarget,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseTarget {
    #[serde(default)]
    pub dialect: String,
    #[serde(default)]
    pub dsn: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DirsConfig {
    #[serde(default)]
    pub logs: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    /// Daily files kept before the oldest is deleted
    #[serde(default = "default_log_max_files")]
    pub max_files: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            max_files: default_log_max_files(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerSettings {
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,
    #[serde(default = "default_table_pacing_millis")]
    pub table_pacing_millis: u64,
    /// Subset of registry tables to sweep, empty means all
    #[serde(default)]
    pub tables: Vec<String>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            idle_interval_secs: default_idle_interval_secs(),
            table_pacing_millis: default_table_pacing_millis(),
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    /// Idle connections above `min_connections` are closed after this long
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            max_lifetime_secs: default_max_lifetime_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_idle_interval_secs() -> u64 {
    30
}

fn default_table_pacing_millis() -> u64 {
    1000
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    0
}

fn default_max_lifetime_secs() -> u64 {
    3600
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_log_max_files() -> usize {
    7
}

impl Config {
    /// Load from a YAML file, with `RECOMPUTE__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self, ::config::ConfigError> {
        ::config::Config::builder()
            .add_source(File::new(path, FileFormat::Yaml))
            .add_source(Environment::with_prefix("RECOMPUTE").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ::config::ConfigError> {
        ::config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }

    /// Reject settings the pool builder would misbehave on
    pub fn validate(&self) -> AppResult<()> {
        let pool = &self.pool;
        if pool.max_connections == 0 {
            return Err(AppError::Config("pool.max_connections must be > 0".to_string()));
        }
        if pool.min_connections > pool.max_connections {
            return Err(AppError::Config(format!(
                "pool.min_connections {} > pool.max_connections {}",
                pool.min_connections, pool.max_connections
            )));
        }
        if self.log.max_files == 0 {
            return Err(AppError::Config("log.max_files must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        if self.recompute_batch_size <= 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.recompute_batch_size as usize
        }
    }

    pub fn debug(&self) -> bool {
        self.isdebug == 1
    }

    pub fn log_dir(&self) -> PathBuf {
        if self.dirs.logs.trim().is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&self.dirs.logs)
        }
    }

    pub fn log_max_files(&self) -> usize {
        self.log.max_files
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.idle_timeout_secs)
    }

    /// `DATABASE_URL` wins over the configured DSN
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.development.dsn.clone())
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.idle_interval_secs)
    }

    pub fn table_pacing(&self) -> Duration {
        Duration::from_millis(self.scheduler.table_pacing_millis)
    }
}
