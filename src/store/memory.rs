// In-memory store used by the pipeline tests.
//
// It interprets statements only as far as the pipeline shapes them: id pages
// carry `[after, limit]`, prefetches carry the id list, lookups carry codes.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{OfficeRow, RateRow, RecomputeStore, SqlValue, Statement};
use crate::error::{AppError, AppResult};
use crate::recompute::models::Record;
use crate::recompute::prefetch::FetchPlan;

#[derive(Default)]
pub struct MemoryStore {
    pub pending_ids: Vec<u64>,
    pub records: HashMap<u64, Record>,
    pub site_offices: Vec<OfficeRow>,
    pub sub_offices: Vec<OfficeRow>,
    pub rates: Vec<RateRow>,

    pub fail_id_fetch: bool,
    pub fail_record_fetch: bool,
    pub fail_batch_update: bool,
    pub fail_row_ids: HashSet<u64>,

    pub id_queries: AtomicUsize,
    pub office_queries: AtomicUsize,
    pub rate_queries: AtomicUsize,
    pub executed: Mutex<Vec<Statement>>,
}

impl MemoryStore {
    pub fn with_records(records: Vec<Record>) -> Self {
        let mut pending_ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        pending_ids.sort_unstable();
        Self {
            pending_ids,
            records: records.into_iter().map(|r| (r.id, r)).collect(),
            ..Default::default()
        }
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.executed.lock().unwrap().clone()
    }

    fn failure(message: &str) -> AppError {
        AppError::Database(sqlx::Error::Protocol(message.to_string()))
    }

    fn uint_args(statement: &Statement) -> Vec<u64> {
        statement
            .args
            .iter()
            .filter_map(|arg| match arg {
                SqlValue::UInt(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    fn text_args(statement: &Statement) -> HashSet<String> {
        statement
            .args
            .iter()
            .filter_map(|arg| match arg {
                SqlValue::Text(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RecomputeStore for MemoryStore {
    async fn fetch_ids(&self, statement: &Statement) -> AppResult<Vec<u64>> {
        self.id_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_id_fetch {
            return Err(Self::failure("id fetch failed"));
        }
        let args = Self::uint_args(statement);
        let (after, limit) = (args[0], args[1] as usize);
        Ok(self
            .pending_ids
            .iter()
            .copied()
            .filter(|id| *id > after)
            .take(limit)
            .collect())
    }

    async fn fetch_records(&self, statement: &Statement, _plan: &FetchPlan) -> AppResult<Vec<Record>> {
        if self.fail_record_fetch {
            return Err(Self::failure("record fetch failed"));
        }
        Ok(Self::uint_args(statement)
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect())
    }

    async fn fetch_offices(&self, statement: &Statement) -> AppResult<Vec<OfficeRow>> {
        self.office_queries.fetch_add(1, Ordering::SeqCst);
        let codes = Self::text_args(statement);
        let source = if statement.sql.contains("data_office_site") {
            &self.site_offices
        } else {
            &self.sub_offices
        };
        Ok(source
            .iter()
            .filter(|row| codes.contains(&row.lookup_code))
            .cloned()
            .collect())
    }

    async fn fetch_rates(&self, _statement: &Statement) -> AppResult<Vec<RateRow>> {
        self.rate_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.rates.clone())
    }

    async fn execute(&self, statement: &Statement) -> AppResult<u64> {
        self.executed.lock().unwrap().push(statement.clone());

        if statement.sql.contains("CASE") {
            if self.fail_batch_update {
                return Err(Self::failure("lock wait timeout exceeded"));
            }
            let ids: HashSet<u64> = Self::uint_args(statement).into_iter().collect();
            return Ok(ids.len() as u64);
        }

        // Per-row statements bind the row id right before the status guard
        let id = Self::uint_args(statement).last().copied().unwrap_or_default();
        if self.fail_row_ids.contains(&id) {
            return Err(Self::failure("row update failed"));
        }
        Ok(1)
    }
}
