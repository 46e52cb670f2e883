// ⚠️ Ledger Errors
// One variant per failure kind a caller can observe

use chrono::NaiveDate;
use rust_decimal::Decimal;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Behavior code is not in the catalog
    #[error("unknown behavior type: {0}")]
    InvalidBehaviorType(String),

    /// Quantity fails the unit-class rule for its behavior
    #[error("invalid value {value} for {behavior_type}: {reason}")]
    InvalidValue {
        behavior_type: String,
        value: Decimal,
        reason: &'static str,
    },

    /// Record is missing or owned by someone else (deliberately indistinguishable)
    #[error("footprint record not found")]
    NotFoundOrForbidden,

    #[error("already checked in {behavior_type} on {date}")]
    AlreadyCheckedInToday {
        behavior_type: String,
        date: NaiveDate,
    },

    #[error("behavior type {0} does not support one-tap check-in")]
    UnsupportedForCheckin(String),

    /// A count-class behavior already has a record for this user and date
    #[error("{behavior_type} is already recorded on {date}")]
    DuplicateCountRecord {
        behavior_type: String,
        date: NaiveDate,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Writing exported records failed (includes the underlying I/O error)
    #[error("export failed: {0}")]
    Export(#[from] csv::Error),
}

impl LedgerError {
    /// Only storage faults are worth retrying; everything else is a caller error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Persistence(_))
    }

    /// True when the error stems from the partial unique index on count-class records.
    pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_persistence_is_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(LedgerError::Persistence(busy).is_retryable());
        assert!(!LedgerError::NotFoundOrForbidden.is_retryable());
        assert!(!LedgerError::InvalidBehaviorType("TRAIN".to_string()).is_retryable());

        let broken_pipe = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert!(!LedgerError::Export(csv::Error::from(broken_pipe)).is_retryable());
    }

    #[test]
    fn test_unique_violation_detection() {
        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
            Some("UNIQUE constraint failed".to_string()),
        );
        assert!(LedgerError::is_unique_violation(&constraint));
        assert!(!LedgerError::is_unique_violation(&rusqlite::Error::QueryReturnedNoRows));

        let check = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_CHECK),
            None,
        );
        assert!(!LedgerError::is_unique_violation(&check));
    }
}
