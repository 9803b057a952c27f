use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlRow};
use sqlx::query::Query;
use sqlx::{FromRow, MySql, Row};
use std::collections::HashMap;

use super::{OfficeRow, RateRow, RecomputeStore, SqlValue, Statement};
use crate::error::AppResult;
use crate::recompute::models::{normalize_currency, Record};
use crate::recompute::prefetch::FetchPlan;

/// MySQL-backed store sharing one connection pool across the pipeline
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn bind_args<'q>(
        mut query: Query<'q, MySql, MySqlArguments>,
        args: &'q [SqlValue],
    ) -> Query<'q, MySql, MySqlArguments> {
        for arg in args {
            query = match arg {
                SqlValue::UInt(v) => query.bind(*v),
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Decimal(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
                SqlValue::Date(v) => query.bind(*v),
                SqlValue::Null => query.bind(Option::<String>::None),
            };
        }
        query
    }

    async fn fetch_rows(&self, statement: &Statement) -> AppResult<Vec<MySqlRow>> {
        let query = Self::bind_args(sqlx::query(&statement.sql), &statement.args);
        Ok(query.fetch_all(&self.pool).await?)
    }

    fn decode_record(row: &MySqlRow, plan: &FetchPlan) -> Result<Record, sqlx::Error> {
        let mut record = Record {
            id: row.try_get("id")?,
            ..Default::default()
        };

        if plan.include_currency_date {
            let currency: Option<String> = row.try_get("currency")?;
            record.currency = currency
                .map(|code| normalize_currency(&code))
                .filter(|code| !code.is_empty());
            record.entry_at = row.try_get::<Option<NaiveDateTime>, _>("entry_date")?;
        }

        if plan.sub_code.is_some() {
            record.sub_code = non_blank(row.try_get("sub_code")?);
        }
        if plan.site_code.is_some() {
            record.site_code = non_blank(row.try_get("site_code")?);
        }

        let mut amounts = HashMap::with_capacity(plan.amount_columns.len());
        for column in &plan.amount_columns {
            let value: Option<Decimal> = row.try_get(*column)?;
            amounts.insert(*column, value);
        }
        record.amounts = amounts;

        Ok(record)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|code| !code.trim().is_empty())
}

#[async_trait]
impl RecomputeStore for MySqlStore {
    async fn fetch_ids(&self, statement: &Statement) -> AppResult<Vec<u64>> {
        let rows = self.fetch_rows(statement).await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(id) = row.try_get::<Option<u64>, _>("id")? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn fetch_records(&self, statement: &Statement, plan: &FetchPlan) -> AppResult<Vec<Record>> {
        let rows = self.fetch_rows(statement).await?;
        let records = rows
            .iter()
            .map(|row| Self::decode_record(row, plan))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn fetch_offices(&self, statement: &Statement) -> AppResult<Vec<OfficeRow>> {
        let rows = self.fetch_rows(statement).await?;
        let offices = rows
            .iter()
            .map(OfficeRow::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(offices)
    }

    async fn fetch_rates(&self, statement: &Statement) -> AppResult<Vec<RateRow>> {
        let rows = self.fetch_rows(statement).await?;
        let rates = rows
            .iter()
            .map(RateRow::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rates)
    }

    async fn execute(&self, statement: &Statement) -> AppResult<u64> {
        let query = Self::bind_args(sqlx::query(&statement.sql), &statement.args);
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
