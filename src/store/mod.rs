// Storage seam for the recompute pipeline.
//
// Pipeline components build SQL as plain `Statement` values; the store binds
// the arguments, runs them and decodes rows into typed values.
pub mod mysql;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::fmt;

use crate::error::{AppResult, WriteError};
use crate::recompute::models::Record;
use crate::recompute::prefetch::FetchPlan;

pub use mysql::MySqlStore;

/// A positional statement argument
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    UInt(u64),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Null,
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::UInt(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v),
            SqlValue::Date(v) => write!(f, "'{}'", v),
            SqlValue::Null => write!(f, "NULL"),
        }
    }
}

/// SQL text with `?` placeholders and its arguments, in order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: String, args: Vec<SqlValue>) -> Self {
        Self { sql, args }
    }

    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }

    /// Every placeholder must have exactly one argument
    pub fn check_arity(&self) -> Result<(), WriteError> {
        let placeholders = self.placeholder_count();
        if placeholders != self.args.len() {
            return Err(WriteError::PlaceholderMismatch {
                placeholders,
                args: self.args.len(),
            });
        }
        Ok(())
    }

    /// Argument list rendered for debug logging
    pub fn args_display(&self) -> String {
        self.args
            .iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Quote a MySQL identifier
pub fn ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `?, ?, ?` for `n` values
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Office hierarchy row joined from the reference tables
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OfficeRow {
    /// Primary key of the most specific table in the join (site or sub)
    pub row_id: u64,
    /// The site or sub code the row was looked up by
    pub lookup_code: String,
    pub main_code: String,
    pub main_name: String,
    pub sub_code: String,
    pub sub_name: String,
}

/// One row of the currency rate history
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RateRow {
    pub id: u64,
    pub date_at: NaiveDate,
    pub currency_from: String,
    pub currency_to: String,
    pub rate: Decimal,
}

/// Raw query/statement access used by the pipeline
#[async_trait]
pub trait RecomputeStore: Send + Sync {
    /// Run an id page query; the single result column is `id`
    async fn fetch_ids(&self, statement: &Statement) -> AppResult<Vec<u64>>;

    /// Run a record prefetch query shaped by `plan`
    async fn fetch_records(&self, statement: &Statement, plan: &FetchPlan) -> AppResult<Vec<Record>>;

    /// Run a site or sub office lookup
    async fn fetch_offices(&self, statement: &Statement) -> AppResult<Vec<OfficeRow>>;

    /// Run a rate history lookup
    async fn fetch_rates(&self, statement: &Statement) -> AppResult<Vec<RateRow>>;

    /// Execute a write statement, returning the affected row count
    async fn execute(&self, statement: &Statement) -> AppResult<u64>;
}
