// Entity Models
//
// Each table has:
// - An entity struct mirroring one row
// - A proposed-row struct for inserts (id assigned by the database)
// - A store borrowing the connection, gated by the row-level policy

pub mod user;
pub mod category;
pub mod expense;

pub use user::{IdentityStore, User, UserId, DEFAULT_CATEGORY_NAME};
pub use category::{Category, CategoryRegistry, NewCategory};
pub use expense::{Expense, ExpenseLedger, NewExpense};
