use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::schema::{REASON_COLUMN, STATUS_COLUMN, STATUS_PENDING, STATUS_RESOLVED};
use crate::store::SqlValue;

/// One pending row loaded for a batch. Lives only as long as the batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub id: u64,
    /// Normalised currency code (trimmed, upper-cased), `None` when NULL or blank
    pub currency: Option<String>,
    pub entry_at: Option<NaiveDateTime>,
    pub sub_code: Option<String>,
    pub site_code: Option<String>,
    /// Amount column name -> value; `None` is SQL NULL
    pub amounts: HashMap<&'static str, Option<Decimal>>,
}

impl Record {
    pub fn entry_date(&self) -> Option<NaiveDate> {
        self.entry_at.map(|at| at.date())
    }

    pub fn amount(&self, column: &str) -> Option<Decimal> {
        self.amounts.get(column).copied().flatten()
    }
}

/// Resolved office hierarchy for a site or sub code
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OfficeInfo {
    pub main_code: String,
    pub main_name: String,
    pub sub_code: String,
    pub sub_name: String,
    /// Only set when resolved through a site code
    pub site_code: Option<String>,
}

/// Conversion targets supported by the rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetCurrency {
    Cny,
    Usdt,
}

impl TargetCurrency {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetCurrency::Cny => "CNY",
            TargetCurrency::Usdt => "USDT",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match normalize_currency(code).as_str() {
            "CNY" => Some(TargetCurrency::Cny),
            "USDT" => Some(TargetCurrency::Usdt),
            _ => None,
        }
    }
}

impl fmt::Display for TargetCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rate key: (calendar date, source currency, target currency)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub date: NaiveDate,
    pub from: String,
    pub to: TargetCurrency,
}

pub fn normalize_currency(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Resolved,
    Pending,
}

impl RecordStatus {
    pub fn code(&self) -> i64 {
        match self {
            RecordStatus::Resolved => STATUS_RESOLVED,
            RecordStatus::Pending => STATUS_PENDING,
        }
    }
}

/// Column updates computed for one record
///
/// `columns` is ordered by column name, so statements built from it have a
/// stable shape. `status` and `recompute_info` are always present once the
/// outcome is set.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSet {
    pub id: u64,
    pub columns: BTreeMap<&'static str, SqlValue>,
    pub status: RecordStatus,
    pub reason: String,
}

impl UpdateSet {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            columns: BTreeMap::new(),
            status: RecordStatus::Pending,
            reason: String::new(),
        }
    }

    pub fn set(&mut self, column: &'static str, value: SqlValue) {
        self.columns.insert(column, value);
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Record the outcome: resolved rows clear the reason column, pending
    /// rows carry the reason text.
    pub fn finish(&mut self, reason: String) {
        if reason.is_empty() {
            self.status = RecordStatus::Resolved;
            self.set(REASON_COLUMN, SqlValue::Null);
        } else {
            self.status = RecordStatus::Pending;
            self.set(REASON_COLUMN, SqlValue::Text(reason.clone()));
        }
        self.set(STATUS_COLUMN, SqlValue::Int(self.status.code()));
        self.reason = reason;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_currency_parse() {
        assert_eq!(TargetCurrency::parse(" usdt "), Some(TargetCurrency::Usdt));
        assert_eq!(TargetCurrency::parse("CNY"), Some(TargetCurrency::Cny));
        assert_eq!(TargetCurrency::parse("HKD"), None);
    }

    #[test]
    fn test_finish_sets_status_and_reason() {
        let mut resolved = UpdateSet::new(7);
        resolved.finish(String::new());
        assert_eq!(resolved.status, RecordStatus::Resolved);
        assert_eq!(resolved.get("status"), Some(&SqlValue::Int(1)));
        assert_eq!(resolved.get("recompute_info"), Some(&SqlValue::Null));

        let mut pending = UpdateSet::new(8);
        pending.finish("rate_reason=currency NULL".to_string());
        assert_eq!(pending.status, RecordStatus::Pending);
        assert_eq!(pending.get("status"), Some(&SqlValue::Int(2)));
        assert_eq!(
            pending.get("recompute_info"),
            Some(&SqlValue::Text("rate_reason=currency NULL".to_string()))
        );
    }

    #[test]
    fn test_record_amount_treats_null_and_missing_alike() {
        let mut record = Record { id: 1, ..Default::default() };
        record.amounts.insert("amount", None);
        assert_eq!(record.amount("amount"), None);
        assert_eq!(record.amount("converted_amount"), None);
    }
}
