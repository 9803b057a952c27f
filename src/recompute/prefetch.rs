use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::recompute::models::Record;
use crate::schema::{
    AmountFieldSet, TableMapping, CURRENCY_COLUMN, ENTRY_DATE_COLUMN, STATUS_COLUMN, STATUS_PENDING,
};
use crate::store::{ident, placeholders, RecomputeStore, SqlValue, Statement};

/// Columns loaded for one batch of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub include_currency_date: bool,
    pub sub_code: Option<&'static str>,
    pub site_code: Option<&'static str>,
    /// Distinct amount columns (base, USDT, CNY), sorted
    pub amount_columns: Vec<&'static str>,
}

impl FetchPlan {
    /// Build the plan for a table. `sets` falls back to the table's own
    /// amount sets when empty.
    ///
    /// Returns `None` when a conversion table ends up with no amount columns;
    /// that is a registry defect and the batch loads nothing.
    pub fn for_table(mapping: &TableMapping, sets: &[AmountFieldSet]) -> Option<Self> {
        let sets = if sets.is_empty() { mapping.amount_sets } else { sets };

        let amount_columns: BTreeSet<&'static str> = sets
            .iter()
            .flat_map(|set| [set.base, set.usdt, set.cny])
            .filter(|column| !column.is_empty())
            .collect();

        if mapping.requires_conversion() && amount_columns.is_empty() {
            return None;
        }

        Some(Self {
            include_currency_date: mapping.requires_conversion(),
            sub_code: mapping.sub_code,
            site_code: mapping.site_code,
            amount_columns: amount_columns.into_iter().collect(),
        })
    }

    pub fn select_list(&self, mapping: &TableMapping) -> Vec<String> {
        let mut columns = vec![format!("CAST({} AS UNSIGNED) AS id", ident(mapping.id_column))];
        if self.include_currency_date {
            columns.push(format!("{} AS currency", ident(CURRENCY_COLUMN)));
            columns.push(format!("CAST({} AS DATETIME) AS entry_date", ident(ENTRY_DATE_COLUMN)));
        }
        if let Some(sub) = self.sub_code {
            columns.push(format!("{} AS sub_code", ident(sub)));
        }
        if let Some(site) = self.site_code {
            columns.push(format!("{} AS site_code", ident(site)));
        }
        for column in &self.amount_columns {
            columns.push(format!("CAST({col} AS DECIMAL(30,10)) AS {col}", col = ident(column)));
        }
        columns
    }

    /// Load the given ids, skipping any row no longer pending
    pub fn statement(&self, mapping: &TableMapping, ids: &[u64]) -> Statement {
        let sql = format!(
            "SELECT {columns} FROM {table} WHERE {id} IN ({ids}) AND {status} = {pending}",
            columns = self.select_list(mapping).join(", "),
            table = ident(mapping.table),
            id = ident(mapping.id_column),
            ids = placeholders(ids.len()),
            status = ident(STATUS_COLUMN),
            pending = STATUS_PENDING,
        );
        Statement::new(sql, ids.iter().map(|id| SqlValue::UInt(*id)).collect())
    }
}

/// Bulk-load the records of one batch keyed by id
pub async fn prefetch_records(
    store: &dyn RecomputeStore,
    mapping: &TableMapping,
    ids: &[u64],
    sets: &[AmountFieldSet],
) -> AppResult<HashMap<u64, Record>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let Some(plan) = FetchPlan::for_table(mapping, sets) else {
        warn!("⚠️ [{}] no amount columns configured, batch skipped", mapping.table);
        return Ok(HashMap::new());
    };
    debug!("[{}] amount columns={:?}", mapping.table, plan.amount_columns);

    let statement = plan.statement(mapping, ids);
    let records = store.fetch_records(&statement, &plan).await?;

    Ok(records.into_iter().map(|record| (record.id, record)).collect())
}
