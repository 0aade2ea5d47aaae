// Error taxonomy for the ledger
//
// Constraint failures raised by SQLite are classified into the same variants
// the application-level checks produce, so callers see one outcome per rule
// whichever layer caught it.

use rusqlite::ffi;
use thiserror::Error;

/// Ledger error type
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unique constraint on `users.email`
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// Foreign key violation on `user_id` or `category_id`
    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrityViolation(String),

    /// Value constraint (`amount >= 0`, required fields)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Row missing, or hidden from the caller by the row-level policy.
    /// The two cases are deliberately indistinguishable.
    #[error("{table} row not found: {id}")]
    NotFound { table: &'static str, id: String },

    /// The proposed row fails the with-check predicate on insert or update
    #[error("New row violates row-level security policy for table {0}")]
    PolicyViolation(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LedgerError {
    pub fn not_found(table: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            table,
            id: id.to_string(),
        }
    }

    /// Classify a SQLite failure into the ledger taxonomy.
    ///
    /// `context` names the value involved (an email, a category id) and ends
    /// up in the error message.
    pub fn from_sqlite(err: rusqlite::Error, context: &str) -> Self {
        let extended_code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => failure.extended_code,
            _ => return LedgerError::Database(err),
        };

        match extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE => LedgerError::DuplicateEmail(context.to_string()),
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                LedgerError::ReferentialIntegrityViolation(context.to_string())
            }
            ffi::SQLITE_CONSTRAINT_CHECK
            | ffi::SQLITE_CONSTRAINT_NOTNULL
            | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            | ffi::SQLITE_CONSTRAINT_TRIGGER => {
                LedgerError::ConstraintViolation(context.to_string())
            }
            _ => LedgerError::Database(err),
        }
    }
}

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
