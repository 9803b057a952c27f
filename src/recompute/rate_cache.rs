use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};

use crate::error::{AppResult, ResolutionError};
use crate::recompute::models::{normalize_currency, RateKey, Record, TargetCurrency};
use crate::store::{placeholders, RateRow, RecomputeStore, SqlValue, Statement};

/// Exchange rates for one batch, newest row per (date, from, to)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateCache {
    rates: HashMap<RateKey, Decimal>,
}

impl RateCache {
    /// Build from raw rows. The row with the highest primary key wins per
    /// key regardless of row order; rows targeting anything other than
    /// CNY/USDT are ignored.
    pub fn from_rows(rows: Vec<RateRow>) -> Self {
        let mut newest: HashMap<RateKey, (u64, Decimal)> = HashMap::new();
        for row in rows {
            let Some(to) = TargetCurrency::parse(&row.currency_to) else {
                continue;
            };
            let key = RateKey {
                date: row.date_at,
                from: normalize_currency(&row.currency_from),
                to,
            };
            if newest.get(&key).is_some_and(|(id, _)| *id >= row.id) {
                continue;
            }
            newest.insert(key, (row.id, row.rate));
        }
        Self {
            rates: newest.into_iter().map(|(key, (_, rate))| (key, rate)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Rate for converting `from` into `to` on `date`. Same-currency pairs are 1.
    pub fn lookup(
        &self,
        date: NaiveDate,
        from: &str,
        to: TargetCurrency,
    ) -> Result<Decimal, ResolutionError> {
        let from = normalize_currency(from);
        if from == to.as_str() {
            return Ok(Decimal::ONE);
        }
        let key = RateKey { date, from, to };
        self.rates
            .get(&key)
            .copied()
            .ok_or_else(|| ResolutionError::MissingRate {
                date,
                from: key.from.clone(),
                to: to.as_str().to_string(),
            })
    }
}

/// Distinct (dates, currencies) of records that carry both
pub fn collect_keys<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> (BTreeSet<NaiveDate>, BTreeSet<String>) {
    let mut dates = BTreeSet::new();
    let mut currencies = BTreeSet::new();
    for record in records {
        if let (Some(date), Some(currency)) = (record.entry_date(), record.currency.as_deref()) {
            dates.insert(date);
            currencies.insert(normalize_currency(currency));
        }
    }
    (dates, currencies)
}

pub fn rate_statement(dates: &BTreeSet<NaiveDate>, currencies: &BTreeSet<String>) -> Statement {
    let sql = format!(
        "SELECT CAST(id AS UNSIGNED) AS id, DATE(date_at) AS date_at, currency_from, currency_to, \
         CAST(rate AS DECIMAL(30,12)) AS rate \
         FROM sys_currency_rate_record \
         WHERE deleted_at IS NULL \
         AND currency_to IN ('CNY','USDT') \
         AND DATE(date_at) IN ({dates}) \
         AND currency_from IN ({currencies}) \
         ORDER BY id DESC",
        dates = placeholders(dates.len()),
        currencies = placeholders(currencies.len()),
    );
    let args = dates
        .iter()
        .map(|date| SqlValue::Date(*date))
        .chain(currencies.iter().map(|code| SqlValue::Text(code.clone())))
        .collect();
    Statement::new(sql, args)
}

/// Load every rate a batch may need in one query
pub async fn build_rate_cache(
    store: &dyn RecomputeStore,
    records: &HashMap<u64, Record>,
) -> AppResult<RateCache> {
    let (dates, currencies) = collect_keys(records.values());
    if dates.is_empty() || currencies.is_empty() {
        return Ok(RateCache::default());
    }

    let rows = store.fetch_rates(&rate_statement(&dates, &currencies)).await?;
    Ok(RateCache::from_rows(rows))
}
