// Expense Ledger - Core Library
// Users, categories and expenses with row-level access control enforced in
// the application layer. Used by the CLI and by the integration tests.

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod money;
pub mod policy;
pub mod reports;

// Re-export commonly used types
pub use config::Config;
pub use db::{open_database, setup_database, Ledger};
pub use entities::{
    Category, CategoryRegistry, NewCategory,
    Expense, ExpenseLedger, NewExpense,
    IdentityStore, User, UserId, DEFAULT_CATEGORY_NAME,
};
pub use error::{LedgerError, Result};
pub use money::format_currency;
pub use policy::{authorize, Caller, Operation, PolicyRow, Table};
pub use reports::{
    category_totals, default_period, monthly_forecast, monthly_totals,
    CategoryTotal, ForecastPoint, MonthlyTotal,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
