// 🏷️ Category Entity - User-scoped labels for classifying expenses
//
// Each category belongs to exactly one user for its whole life. Names are
// free text with no uniqueness constraint; two categories of the same user
// may share a name.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::entities::UserId;
use crate::error::{LedgerError, Result};
use crate::policy::{enforce_using, enforce_with_check, filter_visible, Caller, Operation, PolicyRow, Table};

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
}

impl Category {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
        })
    }
}

impl PolicyRow for Category {
    const TABLE: Table = Table::Categories;

    fn owner(&self) -> UserId {
        self.user_id
    }

    fn row_key(&self) -> String {
        self.id.to_string()
    }
}

/// Proposed row for an insert. The id is assigned by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub user_id: UserId,
    pub name: String,
}

impl PolicyRow for NewCategory {
    const TABLE: Table = Table::Categories;

    fn owner(&self) -> UserId {
        self.user_id
    }

    fn row_key(&self) -> String {
        "(new)".to_string()
    }
}

fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::ConstraintViolation(
            "category name is required".to_string(),
        ));
    }
    Ok(name.to_string())
}

// ============================================================================
// CATEGORY REGISTRY
// ============================================================================

/// Category table access, gated by the row-level policy
pub struct CategoryRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> CategoryRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        CategoryRegistry { conn }
    }

    /// Insert a category. `user_id` must be the caller.
    pub fn create(&self, caller: &Caller, new: NewCategory) -> Result<Category> {
        enforce_with_check(Operation::Insert, &new, caller)?;
        let name = normalize_name(&new.name)?;

        let category = self
            .conn
            .query_row(
                "INSERT INTO categories (user_id, name) VALUES (?1, ?2)
                 RETURNING id, user_id, name",
                params![new.user_id, name],
                Category::from_row,
            )
            .map_err(|e| LedgerError::from_sqlite(e, &format!("user {}", new.user_id)))?;

        tracing::info!(category = category.id, owner = %category.user_id, "category created");
        Ok(category)
    }

    /// Fetch without any policy check; callers apply the using phase.
    fn fetch(&self, id: i64) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, user_id, name FROM categories WHERE id = ?1",
                params![id],
                Category::from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn fetch_for(&self, caller: &Caller, operation: Operation, id: i64) -> Result<Category> {
        let category = self
            .fetch(id)?
            .ok_or_else(|| LedgerError::not_found(Table::Categories.as_str(), id))?;
        enforce_using(operation, &category, caller)?;
        Ok(category)
    }

    pub fn get(&self, caller: &Caller, id: i64) -> Result<Category> {
        self.fetch_for(caller, Operation::Select, id)
    }

    /// All categories visible to the caller, ordered by id
    pub fn list(&self, caller: &Caller) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name FROM categories
             WHERE user_id = ?1
             ORDER BY id",
        )?;

        let categories = stmt
            .query_map(params![caller.user_id()], Category::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(filter_visible(categories, caller))
    }

    /// Find a visible category by name (exact match, case-insensitive).
    /// The lowest id wins when names repeat.
    pub fn find_by_name(&self, caller: &Caller, name: &str) -> Result<Option<Category>> {
        let lower_name = name.trim().to_lowercase();
        Ok(self
            .list(caller)?
            .into_iter()
            .find(|cat| cat.name.to_lowercase() == lower_name))
    }

    /// Find a visible category given as id or name. A number that is not
    /// the id of a visible category is looked up as a name, so categories
    /// named like `2024` stay reachable.
    pub fn find_by_id_or_name(&self, caller: &Caller, key: &str) -> Result<Option<Category>> {
        if let Ok(id) = key.trim().parse::<i64>() {
            match self.get(caller, id) {
                Ok(category) => return Ok(Some(category)),
                Err(LedgerError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        self.find_by_name(caller, key)
    }

    /// Apply `update_fn` to the stored row and write the result back.
    ///
    /// The existing row must pass the using phase and the updated row the
    /// with-check phase, so a category can never be handed to another user.
    pub fn update<F>(&self, caller: &Caller, id: i64, mut update_fn: F) -> Result<Category>
    where
        F: FnMut(&mut Category),
    {
        let current = self.fetch_for(caller, Operation::Update, id)?;

        let mut proposed = current.clone();
        update_fn(&mut proposed);
        proposed.id = current.id;

        enforce_with_check(Operation::Update, &proposed, caller)?;
        let name = normalize_name(&proposed.name)?;

        self.conn
            .execute(
                "UPDATE categories SET user_id = ?1, name = ?2 WHERE id = ?3",
                params![proposed.user_id, name, id],
            )
            .map_err(|e| LedgerError::from_sqlite(e, &format!("category {}", id)))?;

        Ok(Category { name, ..proposed })
    }

    pub fn rename(&self, caller: &Caller, id: i64, name: &str) -> Result<Category> {
        self.update(caller, id, |category| category.name = name.to_string())
    }

    /// Delete a category.
    ///
    /// Restricted: fails with ReferentialIntegrityViolation while expenses
    /// still reference it.
    pub fn delete(&self, caller: &Caller, id: i64) -> Result<()> {
        self.fetch_for(caller, Operation::Delete, id)?;

        self.conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .map_err(|e| {
                LedgerError::from_sqlite(e, &format!("category {} is referenced by expenses", id))
            })?;

        tracing::info!(category = id, "category deleted");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
