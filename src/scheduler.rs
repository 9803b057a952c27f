// Recompute Scheduler - sweeps every configured table forever
//
// Sweep strategy:
// - Tables are driven one at a time, with a short pause before each table
// - Any table with pending work -> start the next sweep right away
// - Every table idle -> heartbeat, then sleep the idle interval

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::recompute::{PassOutcome, TableDriver};
use crate::schema::{self, TableMapping};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep after a sweep in which no table had pending rows
    pub idle_interval: Duration,
    /// Pause before each table in a sweep
    pub table_pacing: Duration,
    pub tables: Vec<&'static TableMapping>,
}

impl SchedulerConfig {
    /// Resolve configured table names against the registry. An empty list
    /// selects every registered table.
    pub fn resolve_tables(names: &[String]) -> Vec<&'static TableMapping> {
        if names.is_empty() {
            return schema::TABLES.iter().collect();
        }
        names
            .iter()
            .filter_map(|name| {
                let mapping = schema::lookup(name);
                if mapping.is_none() {
                    warn!("⚠️ [{}] mapping not found, skip", name);
                }
                mapping
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Idle,
    Pending,
}

impl SweepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepOutcome::Idle => "idle",
            SweepOutcome::Pending => "pending",
        }
    }
}

pub fn heartbeat_line(now: DateTime<Utc>, outcome: SweepOutcome) -> String {
    format!(
        "[HEARTBEAT] {} tables=all status={}",
        now.to_rfc3339(),
        outcome.as_str()
    )
}

pub struct RecomputeScheduler {
    config: SchedulerConfig,
    driver: Arc<TableDriver>,
}

impl RecomputeScheduler {
    pub fn new(config: SchedulerConfig, driver: Arc<TableDriver>) -> Self {
        Self { config, driver }
    }

    /// Start the scheduler in the background
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_forever().await })
    }

    /// Sweep forever. Never returns.
    pub async fn run_forever(&self) {
        info!(
            "🔄 Recompute scheduler started: {} tables, batch size {}",
            self.config.tables.len(),
            self.driver.batch_size()
        );

        loop {
            self.cycle().await;
        }
    }

    /// One sweep, its heartbeat and the pause that follows it
    pub async fn cycle(&self) -> SweepOutcome {
        let outcome = self.sweep().await;
        info!("{}", heartbeat_line(Utc::now(), outcome));

        if let Some(pause) = self.after_sweep(outcome) {
            tokio::time::sleep(pause).await;
        }
        outcome
    }

    /// Sleep only when no table had pending rows
    pub fn after_sweep(&self, outcome: SweepOutcome) -> Option<Duration> {
        match outcome {
            SweepOutcome::Idle => Some(self.config.idle_interval),
            SweepOutcome::Pending => None,
        }
    }

    /// One pass over every configured table
    pub async fn sweep(&self) -> SweepOutcome {
        let mut outcome = SweepOutcome::Idle;
        for mapping in &self.config.tables {
            if !self.config.table_pacing.is_zero() {
                tokio::time::sleep(self.config.table_pacing).await;
            }
            if self.driver.run_pass(mapping).await == PassOutcome::Pending {
                outcome = SweepOutcome::Pending;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recompute::models::Record;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn scheduler(store: MemoryStore, tables: &[&str]) -> RecomputeScheduler {
        scheduler_with_idle(store, tables, Duration::ZERO)
    }

    fn scheduler_with_idle(store: MemoryStore, tables: &[&str], idle: Duration) -> RecomputeScheduler {
        let names: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        let config = SchedulerConfig {
            idle_interval: idle,
            table_pacing: Duration::ZERO,
            tables: SchedulerConfig::resolve_tables(&names),
        };
        let driver = Arc::new(TableDriver::new(Arc::new(store), 100, false));
        RecomputeScheduler::new(config, driver)
    }

    #[test]
    fn test_heartbeat_line() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(
            heartbeat_line(now, SweepOutcome::Idle),
            "[HEARTBEAT] 2024-01-01T10:00:00+00:00 tables=all status=idle"
        );
        assert!(heartbeat_line(now, SweepOutcome::Pending).ends_with("status=pending"));
    }

    #[test]
    fn test_resolve_tables() {
        assert_eq!(SchedulerConfig::resolve_tables(&[]).len(), schema::TABLES.len());

        let names = vec!["acc_balance_sheet".to_string(), "acc_nope".to_string()];
        let tables = SchedulerConfig::resolve_tables(&names);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table, "acc_balance_sheet");
    }

    #[tokio::test]
    async fn test_sweep_is_idle_without_pending_rows() {
        let scheduler = scheduler(MemoryStore::default(), &["acc_cashbook", "acc_channel_info"]);
        assert_eq!(scheduler.sweep().await, SweepOutcome::Idle);
    }

    #[tokio::test]
    async fn test_sweep_is_pending_when_any_table_has_work() {
        let store = MemoryStore::with_records(vec![Record {
            id: 1,
            ..Default::default()
        }]);
        let scheduler = scheduler(store, &["acc_channel_info"]);
        assert_eq!(scheduler.sweep().await, SweepOutcome::Pending);
    }

    #[test]
    fn test_after_sweep_sleeps_only_when_idle() {
        let scheduler = scheduler_with_idle(MemoryStore::default(), &[], Duration::from_secs(30));
        assert_eq!(scheduler.after_sweep(SweepOutcome::Idle), Some(Duration::from_secs(30)));
        assert_eq!(scheduler.after_sweep(SweepOutcome::Pending), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_cycle_waits_idle_interval() {
        let scheduler =
            scheduler_with_idle(MemoryStore::default(), &["acc_cashbook"], Duration::from_secs(30));

        let start = tokio::time::Instant::now();
        assert_eq!(scheduler.cycle().await, SweepOutcome::Idle);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30), "slept {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(31), "slept {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_cycle_starts_next_sweep_immediately() {
        let store = MemoryStore::with_records(vec![Record {
            id: 1,
            ..Default::default()
        }]);
        let scheduler = scheduler_with_idle(store, &["acc_channel_info"], Duration::from_secs(30));

        let start = tokio::time::Instant::now();
        assert_eq!(scheduler.cycle().await, SweepOutcome::Pending);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
