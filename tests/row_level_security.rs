//! Integration tests for the row-level access model
//!
//! These run against a file database so the schema, WAL mode and foreign
//! keys behave as they do for the CLI.

use chrono::NaiveDate;
use expense_ledger::{
    Caller, Ledger, LedgerError, NewCategory, NewExpense, UserId, DEFAULT_CATEGORY_NAME,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

fn open_ledger(temp_dir: &TempDir) -> Ledger {
    Ledger::open(temp_dir.path().join("data").join("ledger.db"))
        .expect("Failed to open test database")
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sign_up(ledger: &Ledger, email: &str) -> Caller {
    Caller::new(ledger.users().sign_up(email).unwrap().id)
}

fn add_category(ledger: &Ledger, caller: &Caller, name: &str) -> i64 {
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

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_user_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);

    let created = ledger.users().create("a@example.com").unwrap();
    let read = ledger.users().get(&Caller::new(created.id)).unwrap();

    assert_eq!(read.email, "a@example.com");
    assert_eq!(read.id, created.id);
    assert_eq!(read.created_at, created.created_at);
}

#[test]
fn test_category_of_a_is_invisible_to_b() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);

    let a = sign_up(&ledger, "a@example.com");
    let b = sign_up(&ledger, "b@example.com");
    add_category(&ledger, &a, "Food");

    let names: Vec<String> = ledger
        .categories()
        .list(&b)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();

    assert_eq!(names, vec![DEFAULT_CATEGORY_NAME.to_string()]);
}

#[test]
fn test_negative_expense_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);
    let a = sign_up(&ledger, "a@example.com");

    let err = ledger
        .expenses()
        .create(&a, NewExpense::new(a.user_id(), day(2025, 1, 1), dec("-5.00")))
        .unwrap_err();

    assert!(matches!(err, LedgerError::ConstraintViolation(_)));
}

#[test]
fn test_expense_with_foreign_category_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);

    let a = sign_up(&ledger, "a@example.com");
    let b = sign_up(&ledger, "b@example.com");
    let b_food = add_category(&ledger, &b, "Food");

    let err = ledger
        .expenses()
        .create(
            &a,
            NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")).with_category(b_food),
        )
        .unwrap_err();

    assert!(matches!(err, LedgerError::ReferentialIntegrityViolation(_)));
    assert!(ledger.expenses().list(&a).unwrap().is_empty());
}

#[test]
fn test_no_operation_reaches_another_users_rows() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);

    let a = sign_up(&ledger, "a@example.com");
    let b = sign_up(&ledger, "b@example.com");
    let food = add_category(&ledger, &a, "Food");
    let expense = ledger
        .expenses()
        .create(
            &a,
            NewExpense::new(a.user_id(), day(2025, 1, 1), dec("10")).with_category(food),
        )
        .unwrap();

    let categories = ledger.categories();
    let expenses = ledger.expenses();

    assert!(matches!(categories.get(&b, food), Err(LedgerError::NotFound { .. })));
    assert!(matches!(categories.rename(&b, food, "x"), Err(LedgerError::NotFound { .. })));
    assert!(matches!(categories.delete(&b, food), Err(LedgerError::NotFound { .. })));
    assert!(matches!(expenses.get(&b, expense.id), Err(LedgerError::NotFound { .. })));
    assert!(matches!(
        expenses.update(&b, expense.id, |e| e.amount = Decimal::ZERO),
        Err(LedgerError::NotFound { .. })
    ));
    assert!(matches!(expenses.delete(&b, expense.id), Err(LedgerError::NotFound { .. })));
    assert!(expenses.list(&b).unwrap().is_empty());

    // Nothing changed for the owner
    assert_eq!(expenses.get(&a, expense.id).unwrap(), expense);
    assert_eq!(categories.get(&a, food).unwrap().name, "Food");
}

#[test]
fn test_missing_and_hidden_rows_look_alike() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);

    let a = sign_up(&ledger, "a@example.com");
    let b = sign_up(&ledger, "b@example.com");
    let food = add_category(&ledger, &a, "Food");

    let hidden = ledger.categories().get(&b, food).unwrap_err();
    let missing = ledger.categories().get(&b, food + 1_000).unwrap_err();

    match (hidden, missing) {
        (
            LedgerError::NotFound { table: t1, .. },
            LedgerError::NotFound { table: t2, .. },
        ) => assert_eq!(t1, t2),
        other => panic!("expected two NotFound errors, got {:?}", other),
    }
}

#[test]
fn test_writes_for_other_owners_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);

    let a = sign_up(&ledger, "a@example.com");
    let b = sign_up(&ledger, "b@example.com");

    let category_err = ledger
        .categories()
        .create(
            &a,
            NewCategory {
                user_id: b.user_id(),
                name: "Planted".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(category_err, LedgerError::PolicyViolation("categories")));

    let expense_err = ledger
        .expenses()
        .create(&a, NewExpense::new(b.user_id(), day(2025, 1, 1), dec("1")))
        .unwrap_err();
    assert!(matches!(expense_err, LedgerError::PolicyViolation("expenses")));

    let own = ledger
        .expenses()
        .create(&a, NewExpense::new(a.user_id(), day(2025, 1, 1), dec("1")))
        .unwrap();
    let transfer_err = ledger
        .expenses()
        .update(&a, own.id, |e| e.user_id = b.user_id())
        .unwrap_err();
    assert!(matches!(transfer_err, LedgerError::PolicyViolation("expenses")));

    assert_eq!(ledger.categories().list(&b).unwrap().len(), 1);
    assert!(ledger.expenses().list(&b).unwrap().is_empty());
}

#[test]
fn test_unknown_identity_cannot_write() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);
    let ghost = Caller::new(UserId::new());

    let err = ledger
        .expenses()
        .create(&ghost, NewExpense::new(ghost.user_id(), day(2025, 1, 1), dec("1")))
        .unwrap_err();
    assert!(matches!(err, LedgerError::ReferentialIntegrityViolation(_)));
}

#[test]
fn test_user_delete_restricted() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);
    let a = sign_up(&ledger, "a@example.com");

    let err = ledger.users().delete(a.user_id()).unwrap_err();
    assert!(matches!(err, LedgerError::ReferentialIntegrityViolation(_)));
    assert!(ledger.users().get(&a).is_ok());
}

#[test]
fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let (a, expense_id) = {
        let ledger = open_ledger(&temp_dir);
        let a = sign_up(&ledger, "a@example.com");
        let expense = ledger
            .expenses()
            .create(
                &a,
                NewExpense::new(a.user_id(), day(2025, 2, 14), dec("99.99"))
                    .with_description("Jantar"),
            )
            .unwrap();
        (a, expense.id)
    };

    let ledger = open_ledger(&temp_dir);
    let expense = ledger.expenses().get(&a, expense_id).unwrap();

    assert_eq!(expense.amount, dec("99.99"));
    assert_eq!(expense.date, day(2025, 2, 14));
    assert_eq!(expense.description.as_deref(), Some("Jantar"));
}

#[test]
fn test_reports_only_see_own_rows() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = open_ledger(&temp_dir);

    let a = sign_up(&ledger, "a@example.com");
    let b = sign_up(&ledger, "b@example.com");
    let a_food = add_category(&ledger, &a, "Food");

    for (month, amount) in [(1, "100"), (2, "100"), (3, "100")] {
        ledger
            .expenses()
            .create(
                &a,
                NewExpense::new(a.user_id(), day(2025, month, 10), dec(amount)).with_category(a_food),
            )
            .unwrap();
    }
    ledger
        .expenses()
        .create(&b, NewExpense::new(b.user_id(), day(2025, 1, 10), dec("5000")))
        .unwrap();

    let totals = ledger.category_totals(&a, None, None).unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].category.as_deref(), Some("Food"));
    assert_eq!(totals[0].total, dec("300"));

    let q1 = ledger
        .category_totals(&a, Some(day(2025, 2, 1)), Some(day(2025, 2, 28)))
        .unwrap();
    assert_eq!(q1[0].total, dec("100"));

    let forecast = ledger.forecast(&a, 3).unwrap();
    assert_eq!(forecast.len(), 6);
    for point in forecast {
        assert!((point.forecast - 100.0).abs() < 1e-9);
    }

    assert!(ledger.forecast(&sign_up(&ledger, "c@example.com"), 3).unwrap().is_empty());
}
