// 👤 User Entity - Identity store
//
// One record per authenticated principal. The id is the identity token the
// authentication collaborator hands out and never changes once stored.
//
// Creating and deleting users is a privileged path (no caller). The only
// policy-gated operation is Select, and a caller sees only their own record.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::parse_timestamp;
use crate::entities::category::{CategoryRegistry, NewCategory};
use crate::error::{LedgerError, Result};
use crate::policy::{enforce_using, Caller, Operation, PolicyRow, Table};

/// Name of the category every new account starts with
pub const DEFAULT_CATEGORY_NAME: &str = "Geral";

// ============================================================================
// USER ID
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Fresh random id
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        UserId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        UserId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(UserId)
            .map_err(|_| LedgerError::InvalidInput(format!("not a user id: {}", s)))
    }
}

impl ToSql for UserId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}

impl FromSql for UserId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Uuid::parse_str(raw)
            .map(UserId)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ============================================================================
// USER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: String = row.get(2)?;
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            created_at: parse_timestamp(2, &created_at)?,
        })
    }
}

impl PolicyRow for User {
    const TABLE: Table = Table::Users;

    fn owner(&self) -> UserId {
        self.id
    }

    fn row_key(&self) -> String {
        self.id.to_string()
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(LedgerError::ConstraintViolation(
            "email is required".to_string(),
        ));
    }
    Ok(email.to_string())
}

// ============================================================================
// IDENTITY STORE
// ============================================================================

pub struct IdentityStore<'c> {
    conn: &'c Connection,
}

impl<'c> IdentityStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        IdentityStore { conn }
    }

    /// Create a user with a fresh id (privileged path).
    pub fn create(&self, email: &str) -> Result<User> {
        self.register(UserId::new(), email)
    }

    /// Store a user under an id issued by the authentication provider
    /// (privileged path).
    pub fn register(&self, id: UserId, email: &str) -> Result<User> {
        let email = normalize_email(email)?;

        let user = self
            .conn
            .query_row(
                "INSERT INTO users (id, email) VALUES (?1, ?2)
                 RETURNING id, email, created_at",
                params![id, email],
                User::from_row,
            )
            .map_err(|e| LedgerError::from_sqlite(e, &email))?;

        tracing::info!(user = %user.id, "user registered");
        Ok(user)
    }

    /// Create the user, then the default category.
    ///
    /// Two separate writes: if the second fails the user still exists
    /// without categories.
    pub fn sign_up(&self, email: &str) -> Result<User> {
        let user = self.create(email)?;
        let caller = Caller::new(user.id);

        CategoryRegistry::new(self.conn).create(
            &caller,
            NewCategory {
                user_id: user.id,
                name: DEFAULT_CATEGORY_NAME.to_string(),
            },
        )?;

        Ok(user)
    }

    /// The caller's own record.
    pub fn get(&self, caller: &Caller) -> Result<User> {
        self.get_by_id(caller, caller.user_id())
    }

    /// Look a user up by id; records other than the caller's are hidden.
    pub fn get_by_id(&self, caller: &Caller, id: UserId) -> Result<User> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, created_at FROM users WHERE id = ?1",
                params![id],
                User::from_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found(Table::Users.as_str(), id))?;

        enforce_using(Operation::Select, &user, caller)?;
        Ok(user)
    }

    /// Look a user up by email; records other than the caller's are hidden.
    pub fn find_by_email(&self, caller: &Caller, email: &str) -> Result<User> {
        let email = email.trim();
        let user = self
            .conn
            .query_row(
                "SELECT id, email, created_at FROM users WHERE email = ?1",
                params![email],
                User::from_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found(Table::Users.as_str(), email))?;

        // Report the looked-up key, not the hidden row's id
        enforce_using(Operation::Select, &user, caller)
            .map_err(|_| LedgerError::not_found(Table::Users.as_str(), email))?;
        Ok(user)
    }

    /// Delete a user (privileged path).
    ///
    /// Restricted: fails with ReferentialIntegrityViolation while the user
    /// still owns categories or expenses.
    pub fn delete(&self, id: UserId) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(|e| {
                LedgerError::from_sqlite(e, &format!("user {} still owns rows", id))
            })?;

        if deleted == 0 {
            return Err(LedgerError::not_found(Table::Users.as_str(), id));
        }

        tracing::info!(user = %id, "user deleted");
        Ok(())
    }

    /// Number of registered users (privileged path).
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }
}
