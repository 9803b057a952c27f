use chrono::NaiveDate;
use thiserror::Error;

/// Top-level error type for the recompute service
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Cursor error: {0}")]
    Cursor(String),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Batch write invariant violations. These are defects, never retried as-is.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WriteError {
    #[error("ids count {actual} != batch size {expected}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("placeholder mismatch sql ?={placeholders} args={args}")]
    PlaceholderMismatch { placeholders: usize, args: usize },

    #[error("no rows to write")]
    EmptyBatch,
}

/// Per-record resolution failures.
///
/// The display text of each variant is what ends up in `recompute_info`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("office not found by site_code")]
    OfficeNotFoundBySiteCode,

    #[error("office not found by sub_code")]
    OfficeNotFoundBySubCode,

    #[error("currency NULL")]
    CurrencyNull,

    #[error("entry_date NULL")]
    EntryDateNull,

    #[error("no rate for {date} {from}->{to}")]
    MissingRate {
        date: NaiveDate,
        from: String,
        to: String,
    },

    #[error("amount overflow on {column}")]
    AmountOverflow { column: String },
}

impl From<::config::ConfigError> for AppError {
    fn from(error: ::config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_reason_text() {
        assert_eq!(
            ResolutionError::OfficeNotFoundBySiteCode.to_string(),
            "office not found by site_code"
        );

        let missing = ResolutionError::MissingRate {
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            from: "HKD".to_string(),
            to: "USDT".to_string(),
        };
        assert_eq!(missing.to_string(), "no rate for 2024-03-09 HKD->USDT");
    }

    #[test]
    fn test_write_error_wraps_into_app_error() {
        let err: AppError = WriteError::BatchSizeMismatch { expected: 100, actual: 3 }.into();
        assert!(matches!(err, AppError::Write(WriteError::BatchSizeMismatch { .. })));
        assert_eq!(err.to_string(), "Write error: ids count 3 != batch size 100");
    }
}
