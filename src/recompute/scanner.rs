use crate::error::{AppError, AppResult};
use crate::schema::TableMapping;
use crate::store::{ident, RecomputeStore, SqlValue, Statement};

/// Keyset cursor over the pending rows of one table
///
/// Pages are `id > last_id ORDER BY id ASC LIMIT n`, so rows resolved or
/// inserted behind the cursor never shift later pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingCursor {
    last_id: u64,
}

impl PendingCursor {
    pub fn new() -> Self {
        Self { last_id: 0 }
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Statement for the next page after the cursor
    pub fn page_statement(&self, mapping: &TableMapping, limit: usize) -> Statement {
        let id = ident(mapping.id_column);
        let sql = format!(
            "SELECT CAST({id} AS UNSIGNED) AS id FROM {table} WHERE ({predicate}) AND {id} > ? ORDER BY {id} ASC LIMIT ?",
            id = id,
            table = ident(mapping.table),
            predicate = mapping.pending_predicate(),
        );
        Statement::new(sql, vec![SqlValue::UInt(self.last_id), SqlValue::UInt(limit as u64)])
    }

    /// Fetch up to `limit` pending ids after the cursor. Empty means the pass is done.
    pub async fn next_page(
        &self,
        store: &dyn RecomputeStore,
        mapping: &TableMapping,
        limit: usize,
    ) -> AppResult<Vec<u64>> {
        store.fetch_ids(&self.page_statement(mapping, limit)).await
    }

    /// Move past the largest id of a page
    pub fn advance(&mut self, ids: &[u64]) -> AppResult<()> {
        let Some(max_id) = ids.iter().copied().max() else {
            return Ok(());
        };
        if max_id <= self.last_id {
            return Err(AppError::Cursor(format!(
                "cursor did not advance: last={} page max={}",
                self.last_id, max_id
            )));
        }
        self.last_id = max_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recompute::models::Record;
    use crate::schema::lookup;
    use crate::store::memory::MemoryStore;

    #[test]
    fn test_page_statement_shape() {
        let mapping = lookup("acc_channel_info").unwrap();
        let statement = PendingCursor::new().page_statement(mapping, 100);
        assert_eq!(
            statement.sql,
            "SELECT CAST(`id` AS UNSIGNED) AS id FROM `acc_channel_info` WHERE (`status` = 2) AND `id` > ? ORDER BY `id` ASC LIMIT ?"
        );
        assert_eq!(statement.args, vec![SqlValue::UInt(0), SqlValue::UInt(100)]);
        assert!(statement.check_arity().is_ok());
    }

    #[test]
    fn test_advance_rejects_non_increasing_page() {
        let mut cursor = PendingCursor::new();
        cursor.advance(&[3, 9, 5]).unwrap();
        assert_eq!(cursor.last_id(), 9);

        cursor.advance(&[]).unwrap();
        assert_eq!(cursor.last_id(), 9);

        assert!(matches!(cursor.advance(&[4, 9]), Err(AppError::Cursor(_))));
    }

    #[tokio::test]
    async fn test_cursor_terminates_over_finite_set() {
        let records = (1..=7).map(|id| Record { id, ..Default::default() }).collect();
        let store = MemoryStore::with_records(records);
        let mapping = lookup("acc_cashbook").unwrap();

        let mut cursor = PendingCursor::new();
        let mut seen = Vec::new();
        loop {
            let ids = cursor.next_page(&store, mapping, 3).await.unwrap();
            if ids.is_empty() {
                break;
            }
            cursor.advance(&ids).unwrap();
            seen.extend(ids);
        }

        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7]);
        // pages of 3, 3, 1 and the empty page
        assert_eq!(store.id_queries.load(std::sync::atomic::Ordering::SeqCst), 4);
    }
}
