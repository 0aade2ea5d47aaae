// 💸 Expense Entity - User-scoped financial records
//
// An expense belongs to one user, carries a date and a non-negative amount,
// and may be tagged with one of its owner's categories. Tagging with another
// user's category is rejected the same way as tagging with a category that
// does not exist, so foreign rows stay invisible.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{format_date, parse_date, parse_timestamp, MAX_YEAR, MIN_YEAR};
use crate::entities::UserId;
use crate::error::{LedgerError, Result};
use crate::money::{from_cents, to_cents};
use crate::policy::{enforce_using, enforce_with_check, filter_visible, Caller, Operation, PolicyRow, Table};

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, dt, category_id, description, amount, created_at FROM expenses";

// ============================================================================
// EXPENSE ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let date: String = row.get(2)?;
        let cents: i64 = row.get(5)?;
        let created_at: String = row.get(6)?;

        Ok(Expense {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: parse_date(2, &date)?,
            category_id: row.get(3)?,
            description: row.get(4)?,
            amount: from_cents(cents),
            created_at: parse_timestamp(6, &created_at)?,
        })
    }
}

impl PolicyRow for Expense {
    const TABLE: Table = Table::Expenses;

    fn owner(&self) -> UserId {
        self.user_id
    }

    fn row_key(&self) -> String {
        self.id.to_string()
    }
}

/// Proposed row for an insert. Id and created_at are assigned by the
/// database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: Option<String>,
    pub category_id: Option<i64>,
}

impl NewExpense {
    pub fn new(user_id: UserId, date: NaiveDate, amount: Decimal) -> Self {
        NewExpense {
            user_id,
            date,
            amount,
            description: None,
            category_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

impl PolicyRow for NewExpense {
    const TABLE: Table = Table::Expenses;

    fn owner(&self) -> UserId {
        self.user_id
    }

    fn row_key(&self) -> String {
        "(new)".to_string()
    }
}

/// Blank descriptions are stored as NULL
fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

// ============================================================================
// EXPENSE LEDGER
// ============================================================================

/// Expense table access, gated by the row-level policy
pub struct ExpenseLedger<'c> {
    conn: &'c Connection,
}

impl<'c> ExpenseLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        ExpenseLedger { conn }
    }

    /// `category_id` must name a category of `owner`.
    ///
    /// The composite foreign key enforces the same rule; checking first gives
    /// a precise message.
    fn check_category(&self, owner: UserId, category_id: Option<i64>) -> Result<()> {
        let Some(category_id) = category_id else {
            return Ok(());
        };

        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM categories WHERE id = ?1 AND user_id = ?2",
                params![category_id, owner],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if !exists {
            return Err(LedgerError::ReferentialIntegrityViolation(format!(
                "category {} does not exist for user {}",
                category_id, owner
            )));
        }
        Ok(())
    }

    /// Insert an expense. `user_id` must be the caller.
    pub fn create(&self, caller: &Caller, new: NewExpense) -> Result<Expense> {
        enforce_with_check(Operation::Insert, &new, caller)?;
        let cents = to_cents(new.amount)?;
        let dt = format_date(new.date)?;
        self.check_category(new.user_id, new.category_id)?;
        let description = normalize_description(new.description);

        let expense = self
            .conn
            .query_row(
                "INSERT INTO expenses (user_id, dt, category_id, description, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING id, user_id, dt, category_id, description, amount, created_at",
                params![
                    new.user_id,
                    dt,
                    new.category_id,
                    description,
                    cents,
                ],
                Expense::from_row,
            )
            .map_err(|e| LedgerError::from_sqlite(e, &format!("expense for user {}", new.user_id)))?;

        tracing::info!(
            expense = expense.id,
            owner = %expense.user_id,
            amount = %expense.amount,
            "expense created"
        );
        Ok(expense)
    }

    /// Fetch without any policy check; callers apply the using phase.
    fn fetch(&self, id: i64) -> Result<Option<Expense>> {
        let expense = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                Expense::from_row,
            )
            .optional()?;
        Ok(expense)
    }

    fn fetch_for(&self, caller: &Caller, operation: Operation, id: i64) -> Result<Expense> {
        let expense = self
            .fetch(id)?
            .ok_or_else(|| LedgerError::not_found(Table::Expenses.as_str(), id))?;
        enforce_using(operation, &expense, caller)?;
        Ok(expense)
    }

    pub fn get(&self, caller: &Caller, id: i64) -> Result<Expense> {
        self.fetch_for(caller, Operation::Select, id)
    }

    /// All expenses visible to the caller, oldest first
    pub fn list(&self, caller: &Caller) -> Result<Vec<Expense>> {
        self.list_between(caller, None, None)
    }

    /// Expenses dated within `[start, end]` (either bound optional), oldest
    /// first, ties broken by id.
    ///
    /// A bound outside the storable years either excludes every row or none.
    pub fn list_between(
        &self,
        caller: &Caller,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Expense>> {
        let start = match start {
            Some(d) if d.year() > MAX_YEAR => return Ok(Vec::new()),
            Some(d) if d.year() < MIN_YEAR => None,
            other => other,
        };
        let end = match end {
            Some(d) if d.year() < MIN_YEAR => return Ok(Vec::new()),
            Some(d) if d.year() > MAX_YEAR => None,
            other => other,
        };
        let start = start.map(format_date).transpose()?;
        let end = end.map(format_date).transpose()?;

        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE user_id = ?1
               AND (?2 IS NULL OR dt >= ?2)
               AND (?3 IS NULL OR dt <= ?3)
             ORDER BY dt ASC, id ASC",
            SELECT_COLUMNS
        ))?;

        let expenses = stmt
            .query_map(
                params![caller.user_id(), start, end],
                Expense::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(filter_visible(expenses, caller))
    }

    /// Apply `update_fn` to the stored row and write the result back.
    ///
    /// Id and created_at are kept from the stored row. The updated row must
    /// pass the with-check phase and the same amount and category rules as
    /// an insert.
    pub fn update<F>(&self, caller: &Caller, id: i64, mut update_fn: F) -> Result<Expense>
    where
        F: FnMut(&mut Expense),
    {
        let current = self.fetch_for(caller, Operation::Update, id)?;

        let mut proposed = current.clone();
        update_fn(&mut proposed);
        proposed.id = current.id;
        proposed.created_at = current.created_at;

        enforce_with_check(Operation::Update, &proposed, caller)?;
        let cents = to_cents(proposed.amount)?;
        let dt = format_date(proposed.date)?;
        self.check_category(proposed.user_id, proposed.category_id)?;
        let description = normalize_description(proposed.description.take());

        self.conn
            .execute(
                "UPDATE expenses
                 SET user_id = ?1, dt = ?2, category_id = ?3, description = ?4, amount = ?5
                 WHERE id = ?6",
                params![
                    proposed.user_id,
                    dt,
                    proposed.category_id,
                    description,
                    cents,
                    id,
                ],
            )
            .map_err(|e| LedgerError::from_sqlite(e, &format!("expense {}", id)))?;

        Ok(Expense {
            description,
            amount: from_cents(cents),
            ..proposed
        })
    }

    pub fn delete(&self, caller: &Caller, id: i64) -> Result<()> {
        self.fetch_for(caller, Operation::Delete, id)?;

        self.conn
            .execute("DELETE FROM expenses WHERE id = ?1", params![id])?;

        tracing::info!(expense = id, "expense deleted");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Ledger;
    use crate::entities::NewCategory;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (Ledger, Caller, Caller) {
        let ledger = Ledger::open_in_memory().unwrap();
        let a = ledger.users().create("a@example.com").unwrap();
        let b = ledger.users().create("b@example.com").unwrap();
        (ledger, Caller::new(a.id), Caller::new(b.id))
    }

    fn category(ledger: &Ledger, caller: &Caller, name: &str) -> i64 {
        ledger
            .categories()
            .create(
                caller,
                NewCategory {
                    user_id: caller.user_id(),
                    name: name.to_string(),
                },
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_create_expense() {
        let (ledger, a, _) = setup();
        let food = category(&ledger, &a, "Food");

        let expense = ledger
            .expenses()
            .create(
                &a,
                NewExpense::new(a.user_id(), day(2025, 1, 15), dec("45.9"))
                    .with_description("Supermercado")
                    .with_category(food),
            )
            .unwrap();

        assert_eq!(expense.amount, dec("45.90"));
        assert_eq!(expense.category_id, Some(food));
        assert_eq!(expense.description.as_deref(), Some("Supermercado"));
        assert_eq!(ledger.expenses().get(&a, expense.id).unwrap(), expense);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let (ledger, a, _) = setup();

        let err = ledger
            .expenses()
            .create(&a, NewExpense::new(a.user_id(), day(2025, 1, 1), dec("-5.00")))
            .unwrap_err();

        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
        assert!(ledger.expenses().list(&a).unwrap().is_empty());
    }

    #[test]
    fn test_negative_amount_blocked_by_storage_check() {
        let (ledger, a, _) = setup();

        let result = ledger.connection().execute(
            "INSERT INTO expenses (user_id, dt, amount) VALUES (?1, '2025-01-01', -500)",
            params![a.user_id()],
        );
        let err = LedgerError::from_sqlite(result.unwrap_err(), "amount");
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
    }

    #[test]
    fn test_foreign_category_rejected() {
        let (ledger, a, b) = setup();
        let theirs = category(&ledger, &b, "Food");

        let err = ledger
            .expenses()
            .create(
                &a,
                NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")).with_category(theirs),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::ReferentialIntegrityViolation(_)));

        let missing = ledger
            .expenses()
            .create(
                &a,
                NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")).with_category(9_999),
            )
            .unwrap_err();
        assert!(matches!(missing, LedgerError::ReferentialIntegrityViolation(_)));
    }

    #[test]
    fn test_foreign_category_blocked_by_storage_key() {
        let (ledger, a, b) = setup();
        let theirs = category(&ledger, &b, "Food");

        let result = ledger.connection().execute(
            "INSERT INTO expenses (user_id, dt, category_id, amount) VALUES (?1, '2025-01-01', ?2, 100)",
            params![a.user_id(), theirs],
        );
        let err = LedgerError::from_sqlite(result.unwrap_err(), "category");
        assert!(matches!(err, LedgerError::ReferentialIntegrityViolation(_)));
    }

    #[test]
    fn test_retag_with_foreign_or_missing_category_rejected() {
        let (ledger, a, b) = setup();
        let food = category(&ledger, &a, "Food");
        let theirs = category(&ledger, &b, "Food");
        let expenses = ledger.expenses();

        let expense = expenses
            .create(
                &a,
                NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")).with_category(food),
            )
            .unwrap();

        for target in [theirs, 9_999] {
            let err = expenses
                .update(&a, expense.id, |e| e.category_id = Some(target))
                .unwrap_err();
            assert!(matches!(err, LedgerError::ReferentialIntegrityViolation(_)));
            assert_eq!(expenses.get(&a, expense.id).unwrap(), expense);
        }
    }

    #[test]
    fn test_dates_beyond_year_9999_rejected() {
        let (ledger, a, _) = setup();
        let expenses = ledger.expenses();
        let far = day(MAX_YEAR + 1, 1, 1);

        let err = expenses
            .create(&a, NewExpense::new(a.user_id(), far, dec("1")))
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
        assert!(expenses.list(&a).unwrap().is_empty());

        let expense = expenses
            .create(&a, NewExpense::new(a.user_id(), day(2025, 1, 1), dec("1")))
            .unwrap();
        let err = expenses.update(&a, expense.id, |e| e.date = far).unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
        assert_eq!(expenses.get(&a, expense.id).unwrap(), expense);
    }

    #[test]
    fn test_list_between_with_unstorable_bounds() {
        let (ledger, a, _) = setup();
        let expenses = ledger.expenses();

        for d in [day(MIN_YEAR, 1, 1), day(2025, 1, 1), day(MAX_YEAR, 12, 31)] {
            expenses
                .create(&a, NewExpense::new(a.user_id(), d, dec("1")))
                .unwrap();
        }

        let before = day(MIN_YEAR - 1, 12, 31);
        let after = day(MAX_YEAR + 1, 1, 1);

        assert_eq!(expenses.list_between(&a, Some(before), Some(after)).unwrap().len(), 3);
        assert_eq!(expenses.list_between(&a, Some(day(2025, 1, 1)), Some(after)).unwrap().len(), 2);
        assert!(expenses.list_between(&a, Some(after), None).unwrap().is_empty());
        assert!(expenses.list_between(&a, None, Some(before)).unwrap().is_empty());
    }

    #[test]
    fn test_insert_for_someone_else_rejected() {
        let (ledger, a, b) = setup();

        let err = ledger
            .expenses()
            .create(&a, NewExpense::new(b.user_id(), day(2025, 1, 1), dec("1")))
            .unwrap_err();

        assert!(matches!(err, LedgerError::PolicyViolation("expenses")));
        assert!(ledger.expenses().list(&b).unwrap().is_empty());
    }

    #[test]
    fn test_stranger_cannot_read_update_or_delete() {
        let (ledger, a, b) = setup();
        let expenses = ledger.expenses();

        let expense = expenses
            .create(&a, NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")))
            .unwrap();

        assert!(expenses.list(&b).unwrap().is_empty());
        assert!(matches!(expenses.get(&b, expense.id), Err(LedgerError::NotFound { .. })));
        assert!(matches!(
            expenses.update(&b, expense.id, |e| e.amount = dec("0")),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(expenses.delete(&b, expense.id), Err(LedgerError::NotFound { .. })));

        assert_eq!(expenses.get(&a, expense.id).unwrap(), expense);
    }

    #[test]
    fn test_update_by_owner() {
        let (ledger, a, _) = setup();
        let food = category(&ledger, &a, "Food");
        let expenses = ledger.expenses();

        let expense = expenses
            .create(&a, NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")))
            .unwrap();

        let updated = expenses
            .update(&a, expense.id, |e| {
                e.amount = dec("12.345");
                e.category_id = Some(food);
                e.description = Some("  ".to_string());
            })
            .unwrap();

        assert_eq!(updated.amount, dec("12.35"));
        assert_eq!(updated.category_id, Some(food));
        assert_eq!(updated.description, None);
        assert_eq!(updated.created_at, expense.created_at);
        assert_eq!(expenses.get(&a, expense.id).unwrap(), updated);
    }

    #[test]
    fn test_update_to_negative_amount_rejected() {
        let (ledger, a, _) = setup();
        let expenses = ledger.expenses();

        let expense = expenses
            .create(&a, NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")))
            .unwrap();

        let err = expenses
            .update(&a, expense.id, |e| e.amount = dec("-0.01"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
        assert_eq!(expenses.get(&a, expense.id).unwrap().amount, dec("10"));
    }

    #[test]
    fn test_owner_cannot_transfer_expense() {
        let (ledger, a, b) = setup();
        let expenses = ledger.expenses();

        let expense = expenses
            .create(&a, NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")))
            .unwrap();

        let err = expenses
            .update(&a, expense.id, |e| e.user_id = b.user_id())
            .unwrap_err();
        assert!(matches!(err, LedgerError::PolicyViolation("expenses")));
        assert!(expenses.list(&b).unwrap().is_empty());
    }

    #[test]
    fn test_list_between_inclusive_and_ordered() {
        let (ledger, a, _) = setup();
        let expenses = ledger.expenses();

        for (d, amount) in [(day(2025, 3, 1), "3"), (day(2025, 1, 1), "1"), (day(2025, 2, 1), "2")] {
            expenses
                .create(&a, NewExpense::new(a.user_id(), d, dec(amount)))
                .unwrap();
        }

        let all: Vec<NaiveDate> = expenses.list(&a).unwrap().iter().map(|e| e.date).collect();
        assert_eq!(all, vec![day(2025, 1, 1), day(2025, 2, 1), day(2025, 3, 1)]);

        let window = expenses
            .list_between(&a, Some(day(2025, 2, 1)), Some(day(2025, 3, 1)))
            .unwrap();
        assert_eq!(window.len(), 2);

        let open_start = expenses.list_between(&a, None, Some(day(2025, 1, 31))).unwrap();
        assert_eq!(open_start.len(), 1);
        assert_eq!(open_start[0].amount, dec("1"));
    }

    #[test]
    fn test_category_delete_restricted_while_referenced() {
        let (ledger, a, _) = setup();
        let food = category(&ledger, &a, "Food");

        let expense = ledger
            .expenses()
            .create(
                &a,
                NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")).with_category(food),
            )
            .unwrap();

        let err = ledger.categories().delete(&a, food).unwrap_err();
        assert!(matches!(err, LedgerError::ReferentialIntegrityViolation(_)));

        ledger.expenses().delete(&a, expense.id).unwrap();
        ledger.categories().delete(&a, food).unwrap();
    }
}
