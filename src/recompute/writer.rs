// Batch writer - persists the update sets of one batch.
//
// Fast path: one UPDATE with a `CASE id WHEN ? THEN ? ... ELSE col END`
// expression per column. Slow path (fast path failed): one guarded UPDATE per
// row, where a failing row is logged and skipped.

use std::collections::BTreeMap;
use tracing::{debug, error, warn};

use crate::error::{AppResult, WriteError};
use crate::recompute::models::UpdateSet;
use crate::schema::{TableMapping, STATUS_COLUMN, STATUS_PENDING};
use crate::store::{ident, placeholders, RecomputeStore, SqlValue, Statement};

/// How a batch ended up being written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub batched: bool,
    pub rows_attempted: usize,
    pub rows_failed: usize,
}

/// Compile all update sets of a batch into one UPDATE statement.
///
/// `expected` is the number of ids requested for the batch; any other count
/// is rejected.
pub fn build_batch_statement(
    mapping: &TableMapping,
    updates: &[UpdateSet],
    expected: usize,
) -> Result<Statement, WriteError> {
    if updates.is_empty() {
        return Err(WriteError::EmptyBatch);
    }
    if updates.len() != expected {
        return Err(WriteError::BatchSizeMismatch {
            expected,
            actual: updates.len(),
        });
    }

    let id_column = ident(mapping.id_column);

    // column -> (when clauses, args), ordered by column name
    let mut cases: BTreeMap<&'static str, (Vec<&'static str>, Vec<SqlValue>)> = BTreeMap::new();
    for update in updates {
        for (column, value) in &update.columns {
            if *column == mapping.id_column {
                continue;
            }
            let (whens, args) = cases.entry(*column).or_default();
            whens.push("WHEN ? THEN ?");
            args.push(SqlValue::UInt(update.id));
            args.push(value.clone());
        }
    }

    let mut set_clauses = Vec::with_capacity(cases.len());
    let mut args = Vec::new();
    for (column, (whens, column_args)) in cases {
        let column = ident(column);
        set_clauses.push(format!(
            "{column} = CASE {id} {whens} ELSE {column} END",
            column = column,
            id = id_column,
            whens = whens.join(" "),
        ));
        args.extend(column_args);
    }
    args.extend(updates.iter().map(|update| SqlValue::UInt(update.id)));

    let sql = format!(
        "UPDATE {table} SET {sets} WHERE {id} IN ({ids}) AND {status} = {pending}",
        table = ident(mapping.table),
        sets = set_clauses.join(", "),
        id = id_column,
        ids = placeholders(updates.len()),
        status = ident(STATUS_COLUMN),
        pending = STATUS_PENDING,
    );

    let statement = Statement::new(sql, args);
    statement.check_arity()?;
    Ok(statement)
}

/// Single-row UPDATE guarded by the pending status
pub fn build_row_statement(mapping: &TableMapping, update: &UpdateSet) -> Statement {
    let mut assignments = Vec::with_capacity(update.columns.len());
    let mut args = Vec::with_capacity(update.columns.len() + 1);
    for (column, value) in &update.columns {
        if *column == mapping.id_column {
            continue;
        }
        assignments.push(format!("{} = ?", ident(column)));
        args.push(value.clone());
    }
    args.push(SqlValue::UInt(update.id));

    let sql = format!(
        "UPDATE {table} SET {sets} WHERE {id} = ? AND {status} = {pending}",
        table = ident(mapping.table),
        sets = assignments.join(", "),
        id = ident(mapping.id_column),
        status = ident(STATUS_COLUMN),
        pending = STATUS_PENDING,
    );
    Statement::new(sql, args)
}

pub struct BatchWriter<'a> {
    store: &'a dyn RecomputeStore,
    mapping: &'a TableMapping,
    debug: bool,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn RecomputeStore, mapping: &'a TableMapping, debug: bool) -> Self {
        Self { store, mapping, debug }
    }

    /// Write one batch, degrading to per-row writes when the batched
    /// statement cannot be built or fails.
    pub async fn write(&self, updates: &[UpdateSet], expected: usize) -> WriteReport {
        if updates.is_empty() {
            return WriteReport {
                batched: true,
                rows_attempted: 0,
                rows_failed: 0,
            };
        }

        match self.write_batched(updates, expected).await {
            Ok(()) => WriteReport {
                batched: true,
                rows_attempted: updates.len(),
                rows_failed: 0,
            },
            Err(e) => {
                warn!(
                    "⚠️ [{}] batch update failed: {}, fallback to per-row",
                    self.mapping.table, e
                );
                self.write_rows(updates).await
            }
        }
    }

    async fn write_batched(&self, updates: &[UpdateSet], expected: usize) -> AppResult<()> {
        let statement = build_batch_statement(self.mapping, updates, expected)?;
        if self.debug {
            debug!(
                "[SQL][{}] {} | args=[{}]",
                self.mapping.table,
                statement.sql,
                statement.args_display()
            );
        }
        self.store.execute(&statement).await?;
        Ok(())
    }

    async fn write_rows(&self, updates: &[UpdateSet]) -> WriteReport {
        let mut rows_failed = 0;
        for update in updates {
            let statement = build_row_statement(self.mapping, update);
            if let Err(e) = self.store.execute(&statement).await {
                rows_failed += 1;
                error!(
                    "❌ [{}][{}] per-row update failed: {}",
                    self.mapping.table, update.id, e
                );
            }
        }
        WriteReport {
            batched: false,
            rows_attempted: updates.len(),
            rows_failed,
        }
    }
}
