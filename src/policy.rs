// 🔐 Access Policy Evaluator - Row-level security in the application layer
//
// Every row-level operation on the ledger is gated by one predicate:
//
//     allowed = row.user_id == caller.identity
//
// Two phases, mirroring the "using" / "with check" split of SQL row security:
// - USING: applied to the existing row (select, update, delete). A failing
//   row is filtered out, so the caller sees NotFound.
// - WITH CHECK: applied to the proposed row (insert, update). A failing row
//   is rejected with PolicyViolation.
//
// The users table only grants Select, restricted to the caller's own record.
// Inserting or deleting users goes through the privileged identity-store path.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::UserId;
use crate::error::{LedgerError, Result};

// ============================================================================
// CALLER
// ============================================================================

/// Authenticated identity of whoever issues an operation.
///
/// Supplied by an external authentication collaborator; this crate never
/// issues or verifies tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    user_id: UserId,
}

impl Caller {
    pub fn new(user_id: UserId) -> Self {
        Caller { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller {}", self.user_id)
    }
}

// ============================================================================
// OPERATIONS & TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Whether the with-check predicate applies to the proposed row
    pub fn has_with_check(&self) -> bool {
        matches!(self, Operation::Insert | Operation::Update)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    Users,
    Categories,
    Expenses,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Categories => "categories",
            Table::Expenses => "expenses",
        }
    }

    /// Operations for which the table defines an owner policy.
    ///
    /// An operation without a policy is denied for every caller.
    pub fn grants(&self, operation: Operation) -> bool {
        match self {
            Table::Users => operation == Operation::Select,
            Table::Categories | Table::Expenses => true,
        }
    }
}

// ============================================================================
// POLICY ROWS
// ============================================================================

/// A row the policy evaluator can judge.
pub trait PolicyRow {
    const TABLE: Table;

    /// The identity the row belongs to (`user_id`, or `id` for users)
    fn owner(&self) -> UserId;

    /// Primary key rendered for error messages
    fn row_key(&self) -> String;
}

/// The single row-level predicate.
///
/// Returns true when `caller` may perform `operation` on `row`. For insert
/// and update, pass the proposed row to evaluate the with-check phase and
/// the existing row to evaluate the using phase; the predicate is the same.
pub fn authorize<R: PolicyRow>(operation: Operation, row: &R, caller: &Caller) -> bool {
    R::TABLE.grants(operation) && row.owner() == caller.user_id()
}

/// USING phase: an existing row the caller may not touch is reported as
/// missing.
pub fn enforce_using<R: PolicyRow>(operation: Operation, row: &R, caller: &Caller) -> Result<()> {
    if authorize(operation, row, caller) {
        return Ok(());
    }

    tracing::debug!(
        table = R::TABLE.as_str(),
        operation = operation.as_str(),
        row = %row.row_key(),
        %caller,
        "row filtered by policy"
    );
    Err(LedgerError::not_found(R::TABLE.as_str(), row.row_key()))
}

/// WITH CHECK phase: a proposed row the caller may not write is rejected.
pub fn enforce_with_check<R: PolicyRow>(
    operation: Operation,
    proposed: &R,
    caller: &Caller,
) -> Result<()> {
    debug_assert!(operation.has_with_check());

    if authorize(operation, proposed, caller) {
        return Ok(());
    }

    tracing::debug!(
        table = R::TABLE.as_str(),
        operation = operation.as_str(),
        owner = %proposed.owner(),
        %caller,
        "proposed row rejected by with-check policy"
    );
    Err(LedgerError::PolicyViolation(R::TABLE.as_str()))
}

/// Drop every row the caller may not select.
pub fn filter_visible<R: PolicyRow>(rows: Vec<R>, caller: &Caller) -> Vec<R> {
    rows.into_iter()
        .filter(|row| authorize(Operation::Select, row, caller))
        .collect()
}
