use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::error::AppResult;
use crate::recompute::calculator::RecordCalculator;
use crate::recompute::office_cache::build_office_cache;
use crate::recompute::prefetch::prefetch_records;
use crate::recompute::rate_cache::build_rate_cache;
use crate::recompute::scanner::PendingCursor;
use crate::recompute::writer::{BatchWriter, WriteReport};
use crate::schema::TableMapping;
use crate::store::RecomputeStore;

/// Result of one pass over a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The first page was empty
    Idle,
    /// At least one batch was processed, or the pass was cut short by an error
    Pending,
}

/// Summary of one processed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub fetched: usize,
    pub loaded: usize,
    pub resolved: usize,
    pub still_pending: usize,
    pub write: WriteReport,
}

/// Drives one table through cursor -> prefetch -> caches -> compute -> write
pub struct TableDriver {
    store: Arc<dyn RecomputeStore>,
    batch_size: usize,
    debug: bool,
}

impl TableDriver {
    pub fn new(store: Arc<dyn RecomputeStore>, batch_size: usize, debug: bool) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            debug,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run batches until the cursor runs out of pending rows
    #[instrument(skip(self, mapping), fields(table = mapping.table))]
    pub async fn run_pass(&self, mapping: &TableMapping) -> PassOutcome {
        let mut cursor = PendingCursor::new();
        let mut processed_any = false;

        loop {
            let ids = match cursor.next_page(self.store.as_ref(), mapping, self.batch_size).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!("❌ [{}] fetch ids error: {}", mapping.table, e);
                    return PassOutcome::Pending;
                }
            };

            let (Some(first), Some(last)) = (ids.first(), ids.last()) else {
                return if processed_any {
                    PassOutcome::Pending
                } else {
                    PassOutcome::Idle
                };
            };
            processed_any = true;
            info!("[{}] batch size={} range={}-{}", mapping.table, ids.len(), first, last);

            if let Err(e) = cursor.advance(&ids) {
                error!("❌ [{}] {}", mapping.table, e);
                return PassOutcome::Pending;
            }

            // Batch-level failures abandon only this batch; its rows stay
            // pending and come back on the next sweep.
            match self.process_batch(mapping, &ids).await {
                Ok(summary) => info!(
                    "[{}] batch done fetched={} loaded={} resolved={} pending={} batched={}",
                    mapping.table,
                    summary.fetched,
                    summary.loaded,
                    summary.resolved,
                    summary.still_pending,
                    summary.write.batched
                ),
                Err(e) => error!("❌ [{}] batch {}-{} skipped: {}", mapping.table, first, last, e),
            }
        }
    }

    /// Process one page of ids
    pub async fn process_batch(&self, mapping: &TableMapping, ids: &[u64]) -> AppResult<BatchSummary> {
        let store = self.store.as_ref();
        let sets = mapping.amount_sets;

        let records = prefetch_records(store, mapping, ids, sets).await?;
        let offices = build_office_cache(store, &records).await?;
        let rates = build_rate_cache(store, &records).await?;

        let calculator = RecordCalculator::new(mapping, sets, &offices, &rates);
        let mut updates = Vec::with_capacity(ids.len());
        let (mut resolved, mut still_pending) = (0, 0);

        for id in ids {
            let Some(record) = records.get(id) else {
                debug!("[recompute][{}][{}] skip: no longer pending", mapping.table, id);
                continue;
            };
            let update = calculator.compute(record);
            if update.is_empty() {
                debug!("[recompute][{}][{}] skip: {}", mapping.table, id, update.reason);
                continue;
            }
            if update.reason.is_empty() {
                resolved += 1;
            } else {
                still_pending += 1;
                debug!("[recompute][{}][{}] pending: {}", mapping.table, id, update.reason);
            }
            updates.push(update);
        }

        let write = BatchWriter::new(store, mapping, self.debug)
            .write(&updates, ids.len())
            .await;
        if write.rows_failed > 0 {
            error!(
                "❌ [{}] {} of {} rows failed to write",
                mapping.table, write.rows_failed, write.rows_attempted
            );
        }

        Ok(BatchSummary {
            fetched: ids.len(),
            loaded: records.len(),
            resolved,
            still_pending,
            write,
        })
    }
}
