// Record calculator - pure per-record computation, no I/O.
//
// Steps for one record:
// 1. Resolve the office through the site code, else the sub code
// 2. Convert every amount set with a non-NULL base into CNY and USDT
// 3. Fold failures into `status` and a tagged reason string

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ResolutionError;
use crate::recompute::models::{OfficeInfo, Record, TargetCurrency, UpdateSet};
use crate::recompute::office_cache::OfficeCache;
use crate::recompute::rate_cache::RateCache;
use crate::schema::{
    AmountFieldSet, TableMapping, MAIN_OFFICE_NAME_COLUMN, SITE_NAME_COLUMN, SUB_OFFICE_NAME_COLUMN,
};
use crate::store::SqlValue;

/// Round to 2 decimal places, half away from zero
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converted (CNY, USDT) amounts for one base value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Converted {
    pub cny: Decimal,
    pub usdt: Decimal,
}

pub struct RecordCalculator<'a> {
    mapping: &'a TableMapping,
    sets: &'a [AmountFieldSet],
    offices: &'a OfficeCache,
    rates: &'a RateCache,
}

impl<'a> RecordCalculator<'a> {
    pub fn new(
        mapping: &'a TableMapping,
        sets: &'a [AmountFieldSet],
        offices: &'a OfficeCache,
        rates: &'a RateCache,
    ) -> Self {
        let sets = if sets.is_empty() { mapping.amount_sets } else { sets };
        Self {
            mapping,
            sets,
            offices,
            rates,
        }
    }

    /// Compute the column updates for one record
    pub fn compute(&self, record: &Record) -> UpdateSet {
        let mut update = UpdateSet::new(record.id);

        let (office, office_reason) = match self.resolve_office(record) {
            Ok(office) => (office, None),
            Err(err) => (None, Some(err.to_string())),
        };

        let mut rate_reasons: Vec<String> = Vec::new();
        if self.mapping.requires_conversion() {
            match currency_and_date(record) {
                Ok((currency, date)) => {
                    for set in self.sets {
                        let Some(base) = record.amount(set.base) else {
                            continue;
                        };
                        match self.convert(currency, date, set, base) {
                            Ok(converted) => {
                                update.set(set.cny, SqlValue::Decimal(converted.cny));
                                update.set(set.usdt, SqlValue::Decimal(converted.usdt));
                            }
                            Err(errors) => {
                                for err in errors {
                                    let reason = err.to_string();
                                    if !rate_reasons.contains(&reason) {
                                        rate_reasons.push(reason);
                                    }
                                }
                            }
                        }
                    }
                }
                // Fails the record even when every base is NULL
                Err(errors) => rate_reasons.extend(errors.iter().map(ToString::to_string)),
            }
        }

        if let Some(office) = office {
            self.apply_office(&mut update, office);
        }

        let mut parts = Vec::new();
        if let Some(reason) = office_reason {
            parts.push(format!("office_reason={}", reason));
        }
        if !rate_reasons.is_empty() {
            parts.push(format!("rate_reason={}", rate_reasons.join("; ")));
        }
        update.finish(parts.join("; "));

        update
    }

    /// Site code first, then sub code. No declared code on the record means
    /// no office is required.
    fn resolve_office(&self, record: &Record) -> Result<Option<&'a OfficeInfo>, ResolutionError> {
        if let (Some(_), Some(site)) = (self.mapping.site_code, non_empty(&record.site_code)) {
            return self
                .offices
                .site(site)
                .map(Some)
                .ok_or(ResolutionError::OfficeNotFoundBySiteCode);
        }
        if let (Some(_), Some(sub)) = (self.mapping.sub_code, non_empty(&record.sub_code)) {
            return self
                .offices
                .sub(sub)
                .map(Some)
                .ok_or(ResolutionError::OfficeNotFoundBySubCode);
        }
        Ok(None)
    }

    fn convert(
        &self,
        currency: &str,
        date: NaiveDate,
        set: &AmountFieldSet,
        base: Decimal,
    ) -> Result<Converted, Vec<ResolutionError>> {
        let converted = match currency {
            "CNY" => Converted {
                cny: base,
                usdt: self.scale(base, date, currency, TargetCurrency::Usdt, set.usdt)?,
            },
            "USDT" => Converted {
                cny: self.scale(base, date, currency, TargetCurrency::Cny, set.cny)?,
                usdt: base,
            },
            _ => Converted {
                cny: self.scale(base, date, currency, TargetCurrency::Cny, set.cny)?,
                usdt: self.scale(base, date, currency, TargetCurrency::Usdt, set.usdt)?,
            },
        };
        Ok(converted)
    }

    fn scale(
        &self,
        base: Decimal,
        date: NaiveDate,
        from: &str,
        to: TargetCurrency,
        column: &str,
    ) -> Result<Decimal, Vec<ResolutionError>> {
        let rate = self.rates.lookup(date, from, to).map_err(|err| vec![err])?;
        base.checked_mul(rate).map(round_amount).ok_or_else(|| {
            vec![ResolutionError::AmountOverflow {
                column: column.to_string(),
            }]
        })
    }

    fn apply_office(&self, update: &mut UpdateSet, office: &OfficeInfo) {
        if let Some(column) = self.mapping.main_code.filter(|_| !office.main_code.is_empty()) {
            update.set(column, SqlValue::Text(office.main_code.clone()));
        }
        if let Some(column) = self.mapping.sub_code.filter(|_| !office.sub_code.is_empty()) {
            update.set(column, SqlValue::Text(office.sub_code.clone()));
        }
        let site = office.site_code.as_deref().filter(|code| !code.is_empty());
        if let (Some(column), Some(site)) = (self.mapping.site_code, site) {
            update.set(column, SqlValue::Text(site.to_string()));
        }

        if !office.main_name.is_empty() {
            update.set(MAIN_OFFICE_NAME_COLUMN, SqlValue::Text(office.main_name.clone()));
        }
        if !office.sub_name.is_empty() {
            update.set(SUB_OFFICE_NAME_COLUMN, SqlValue::Text(office.sub_name.clone()));
        }
        if let Some(site) = site {
            update.set(SITE_NAME_COLUMN, SqlValue::Text(site.to_string()));
        }
    }
}

fn currency_and_date(record: &Record) -> Result<(&str, NaiveDate), Vec<ResolutionError>> {
    match (record.currency.as_deref(), record.entry_date()) {
        (Some(currency), Some(date)) => Ok((currency, date)),
        (currency, date) => {
            let mut errors = Vec::new();
            if currency.is_none() {
                errors.push(ResolutionError::CurrencyNull);
            }
            if date.is_none() {
                errors.push(ResolutionError::EntryDateNull);
            }
            Err(errors)
        }
    }
}

fn non_empty(code: &Option<String>) -> Option<&str> {
    code.as_deref().filter(|code| !code.is_empty())
}
