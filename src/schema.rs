// Schema registry - which accounting tables get recomputed and how their
// columns are laid out.
//
// Every table carries:
// - an id column used for keyset paging
// - optional main/sub/site code columns for office resolution
// - zero or more amount triples (base, USDT, CNY)
//
// The office-only table (`acc_channel_info`) never converts currency, which is
// expressed through `TableKind` instead of comparing table names.

use std::collections::HashSet;

use crate::error::{AppError, AppResult};

/// Status value of a row that still needs recomputation
pub const STATUS_PENDING: i64 = 2;
/// Status value of a fully resolved row
pub const STATUS_RESOLVED: i64 = 1;

pub const STATUS_COLUMN: &str = "status";
pub const REASON_COLUMN: &str = "recompute_info";
pub const CURRENCY_COLUMN: &str = "currency";
pub const ENTRY_DATE_COLUMN: &str = "entry_date";

// Office name columns. Written after the code columns, so they win when a
// table reuses one of these names for a code column.
pub const MAIN_OFFICE_NAME_COLUMN: &str = "main_office";
pub const SUB_OFFICE_NAME_COLUMN: &str = "sub_office";
pub const SITE_NAME_COLUMN: &str = "site";

/// One raw amount column and the two converted columns derived from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AmountFieldSet {
    pub base: &'static str,
    pub usdt: &'static str,
    pub cny: &'static str,
}

const fn amount(base: &'static str, usdt: &'static str, cny: &'static str) -> AmountFieldSet {
    AmountFieldSet { base, usdt, cny }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Rows carry amounts that need CNY/USDT conversion
    Monetary,
    /// Rows only need office resolution
    OfficeOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    pub table: &'static str,
    pub id_column: &'static str,
    pub main_code: Option<&'static str>,
    pub sub_code: Option<&'static str>,
    pub site_code: Option<&'static str>,
    pub kind: TableKind,
    pub amount_sets: &'static [AmountFieldSet],
}

impl TableMapping {
    pub fn requires_conversion(&self) -> bool {
        self.kind == TableKind::Monetary
    }

    /// SQL predicate selecting rows that are still pending and complete
    /// enough to be processed.
    pub fn pending_predicate(&self) -> String {
        let mut predicate = format!("`{}` = {}", STATUS_COLUMN, STATUS_PENDING);
        if self.requires_conversion() {
            predicate.push_str(&format!(
                " AND `{date}` IS NOT NULL AND `{cur}` IS NOT NULL AND `{cur}` <> ''",
                date = ENTRY_DATE_COLUMN,
                cur = CURRENCY_COLUMN,
            ));
        }
        predicate
    }

    /// Check the registry invariants for this table
    pub fn validate(&self) -> AppResult<()> {
        if self.id_column.is_empty() {
            return Err(AppError::Schema(format!("{}: empty id column", self.table)));
        }

        if self.requires_conversion() && self.amount_sets.is_empty() {
            return Err(AppError::Schema(format!(
                "{}: conversion table without amount columns",
                self.table
            )));
        }

        let mut bases = HashSet::new();
        for set in self.amount_sets {
            if set.base.is_empty() || set.usdt.is_empty() || set.cny.is_empty() {
                return Err(AppError::Schema(format!(
                    "{}: incomplete amount set {:?}",
                    self.table, set
                )));
            }
            if !bases.insert(set.base) {
                return Err(AppError::Schema(format!(
                    "{}: base column {} mapped more than once",
                    self.table, set.base
                )));
            }
        }

        Ok(())
    }
}

const CASHBOOK_AMOUNTS: &[AmountFieldSet] = &[
    amount("amount", "amount_usdt", "amount_cny"),
    amount("converted_amount", "converted_amount_usdt", "converted_amount_cny"),
];

const RECHARGE_WITHDRAW_AMOUNTS: &[AmountFieldSet] = &[
    amount("recharge_amount", "recharge_amount_usdt", "recharge_amount_cny"),
    amount("withdraw_amount", "withdraw_amount_usdt", "withdraw_amount_cny"),
    amount("commission", "commission_usdt", "commission_cny"),
    amount("discount", "discount_usdt", "discount_cny"),
    amount("first_topup_amount", "first_topup_amount_USDT", "first_topup_amount_CNY"),
    amount("manual_score_increase", "manual_score_increase_usdt", "manual_score_increase_cny"),
    amount("manual_score_decrease", "manual_score_decrease_usdt", "manual_score_decrease_cny"),
    amount("total_score_balance", "total_score_balance_usdt", "total_score_balance_cny"),
];

const AD_PERFORMANCE_AMOUNTS: &[AmountFieldSet] = &[
    amount("first_topup_amount", "first_topup_amount_USDT", "first_topup_amount_CNY"),
    amount("repeat_topup_amount", "repeat_topup_amount_USDT", "repeat_topup_amount_CNY"),
    amount("d2_topup_amount", "d2_topup_amount_USDT", "d2_topup_amount_CNY"),
    amount("d3_topup_amount", "d3_topup_amount_USDT", "d3_topup_amount_CNY"),
    amount("d4_topup_amount", "d4_topup_amount_USDT", "d4_topup_amount_CNY"),
    amount("d5_topup_amount", "d5_topup_amount_USDT", "d5_topup_amount_CNY"),
    amount("d6_topup_amount", "d6_topup_amount_USDT", "d6_topup_amount_CNY"),
    amount("d7_topup_amount", "d7_topup_amount_USDT", "d7_topup_amount_CNY"),
    amount("d14_topup_amount", "d14_topup_amount_USDT", "d14_topup_amount_CNY"),
    amount("d15_topup_amount", "d15_topup_amount_USDT", "d15_topup_amount_CNY"),
    amount("d30_topup_amount", "d30_topup_amount_USDT", "d30_topup_amount_CNY"),
    amount("d45_topup_amount", "d45_topup_amount_USDT", "d45_topup_amount_CNY"),
    amount("d60_topup_amount", "d60_topup_amount_USDT", "d60_topup_amount_CNY"),
];

const BALANCE_SHEET_AMOUNTS: &[AmountFieldSet] = &[
    amount("ending_amount", "ending_amount_USDT", "ending_amount_CNY"),
    amount("income_amount", "income_amount_USDT", "income_amount_CNY"),
    amount("non_member_income", "non_member_income_USDT", "non_member_income_CNY"),
    amount("income_fee", "income_fee_USDT", "income_fee_CNY"),
    amount("expense_amount", "expense_amount_USDT", "expense_amount_CNY"),
    amount("non_member_expense", "non_member_expense_USDT", "non_member_expense_CNY"),
    amount("expense_fee", "expense_fee_USDT", "expense_fee_CNY"),
    amount("balance_difference", "balance_difference_USDT", "balance_difference_CNY"),
    amount("opening_balance", "opening_balance_USDT", "opening_balance_CNY"),
    amount("backend_revenue", "backend_revenue_USDT", "backend_revenue_CNY"),
    amount("order_adjustment", "order_adjustment_USDT", "order_adjustment_CNY"),
    amount("converted_amount", "converted_amount_USDT", "converted_amount_CNY"),
    amount("balance_verification", "balance_verification_USDT", "balance_verification_CNY"),
    amount("difference", "difference_USDT", "difference_CNY"),
];

const OPERATIONAL_AMOUNTS: &[AmountFieldSet] = &[
    amount("valid_bet", "valid_bet_USDT", "valid_bet_CNY"),
    amount("cashback", "cashback_USDT", "cashback_CNY"),
    amount("profit_and_loss", "profit_and_loss_USDT", "profit_and_loss_CNY"),
];

const fn office_table(
    table: &'static str,
    kind: TableKind,
    amount_sets: &'static [AmountFieldSet],
) -> TableMapping {
    TableMapping {
        table,
        id_column: "id",
        main_code: Some("main_office"),
        sub_code: Some("sub_office"),
        site_code: Some("site_code"),
        kind,
        amount_sets,
    }
}

/// All recomputed tables, in sweep order
pub static TABLES: &[TableMapping] = &[
    TableMapping {
        table: "acc_cashbook",
        id_column: "id",
        main_code: Some("main_office"),
        sub_code: Some("sub_code"),
        site_code: None,
        kind: TableKind::Monetary,
        amount_sets: CASHBOOK_AMOUNTS,
    },
    office_table("acc_expenses", TableKind::Monetary, CASHBOOK_AMOUNTS),
    office_table("acc_borrow_lend", TableKind::Monetary, CASHBOOK_AMOUNTS),
    office_table("acc_recharge_withdraw", TableKind::Monetary, RECHARGE_WITHDRAW_AMOUNTS),
    office_table("acc_channel_info", TableKind::OfficeOnly, &[]),
    office_table("acc_ad_performance_analysis", TableKind::Monetary, AD_PERFORMANCE_AMOUNTS),
    office_table("acc_balance_sheet", TableKind::Monetary, BALANCE_SHEET_AMOUNTS),
    office_table("acc_revenue_expense_adjustments", TableKind::Monetary, CASHBOOK_AMOUNTS),
    office_table("acc_operational_information", TableKind::Monetary, OPERATIONAL_AMOUNTS),
];

/// Find a table mapping by table name
pub fn lookup(table: &str) -> Option<&'static TableMapping> {
    TABLES.iter().find(|mapping| mapping.table == table)
}

/// Validate every registered table, called once at startup
pub fn validate_registry() -> AppResult<()> {
    let mut names = HashSet::new();
    for mapping in TABLES {
        if !names.insert(mapping.table) {
            return Err(AppError::Schema(format!("duplicate table {}", mapping.table)));
        }
        mapping.validate()?;
    }
    Ok(())
}
