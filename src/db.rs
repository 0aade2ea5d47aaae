use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::Path;

use crate::entities::{CategoryRegistry, ExpenseLedger, IdentityStore};
use crate::error::{LedgerError, Result};

/// Storage format for `expenses.dt`; lexical order equals date order
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Years that `DATE_FORMAT` writes as four unsigned digits. Outside this
/// range chrono adds a sign and text order no longer matches date order.
pub const MIN_YEAR: i32 = 0;
pub const MAX_YEAR: i32 = 9999;

/// Open or create the database at `path` and make sure the schema exists.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    tracing::info!("Opening database at: {:?}", path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                tracing::error!("Failed to create database directory: {}", e);
                LedgerError::Io(e)
            })?;
        }
    }

    let conn = Connection::open(path)?;
    // Enable WAL mode for crash recovery
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(journal_mode = %mode, "journal mode set");
    setup_database(&conn)?;

    tracing::info!("Database initialized successfully");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Foreign keys are off by default in SQLite and must be enabled per
    // connection
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Users (identity store)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY NOT NULL,
            email TEXT UNIQUE NOT NULL CHECK (length(trim(email)) > 0),
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS users_id_immutable
         BEFORE UPDATE OF id ON users
         WHEN NEW.id <> OLD.id
         BEGIN
            SELECT RAISE(ABORT, 'users.id is immutable');
         END",
        [],
    )?;

    // ==========================================================================
    // Categories (registry)
    // (id, user_id) is unique so expenses can reference a category together
    // with its owner
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id),
            name TEXT NOT NULL CHECK (length(trim(name)) > 0),
            UNIQUE (id, user_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Expenses (ledger)
    // amount is stored in cents
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id),
            dt TEXT NOT NULL CHECK (dt GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]'),
            category_id INTEGER,
            description TEXT,
            amount INTEGER NOT NULL CHECK (amount >= 0),
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            FOREIGN KEY (category_id, user_id) REFERENCES categories(id, user_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_categories_user ON categories(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_user_dt ON expenses(user_id, dt)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_category ON expenses(category_id, user_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// LEDGER HANDLE
// ============================================================================

/// Owns the connection and hands out the three table stores.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Ledger {
            conn: open_database(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Ledger { conn })
    }

    pub fn users(&self) -> IdentityStore<'_> {
        IdentityStore::new(&self.conn)
    }

    pub fn categories(&self) -> CategoryRegistry<'_> {
        CategoryRegistry::new(&self.conn)
    }

    pub fn expenses(&self) -> ExpenseLedger<'_> {
        ExpenseLedger::new(&self.conn)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn format_date(date: NaiveDate) -> Result<String> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&date.year()) {
        return Err(LedgerError::ConstraintViolation(format!(
            "date {} is outside years {:04}-{:04}",
            date, MIN_YEAR, MAX_YEAR
        )));
    }
    Ok(date.format(DATE_FORMAT).to_string())
}
