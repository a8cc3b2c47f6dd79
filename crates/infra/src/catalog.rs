//! Catalog repository: ingredients, menus with their recipes, and clients.
//!
//! Catalog edits never create orders or deduct stock for an order. The only
//! stock changes made here are creation, restock and manual adjustment, each
//! journaled as a stock movement.

use std::collections::BTreeMap;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use thiserror::Error;
use tracing::{info, instrument};

use comanda_clients::{Client, ClientUpdate, NewClient};
use comanda_core::{ClientId, DomainError, IngredientId, MenuId, Money};
use comanda_inventory::ingredient::validate_restock;
use comanda_inventory::{Ingredient, IngredientUpdate, NewIngredient};
use comanda_menu::{Menu, MenuUpdate, NewMenu, Recipe, RecipeEntry};
use comanda_sales::ReceiptError;

use crate::db::{SqlFailure, Store, WriteTx, classify, now_millis};
use crate::ledger::{MovementReason, record_movement};

/// Catalog and order-correction failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{entity} already exists: {detail}")]
    Duplicate { entity: &'static str, detail: String },

    #[error("{entity} {id} is still referenced by {referenced_by}")]
    InUse {
        entity: &'static str,
        id: i64,
        referenced_by: &'static str,
    },

    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    #[error("database busy: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl CatalogError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        CatalogError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CatalogError {
    match classify(operation, &err) {
        SqlFailure::Busy(msg) => CatalogError::Conflict(msg),
        SqlFailure::Unique(msg) => CatalogError::Duplicate {
            entity: "record",
            detail: msg,
        },
        SqlFailure::Check(msg) => CatalogError::Invalid(DomainError::invariant(msg)),
        SqlFailure::ForeignKey(msg) | SqlFailure::Other(msg) => CatalogError::Storage(msg),
    }
}

/// Like [`map_sqlx_error`], naming the duplicated entity.
fn map_write_error(operation: &str, entity: &'static str, detail: &str, err: sqlx::Error) -> CatalogError {
    match map_sqlx_error(operation, err) {
        CatalogError::Duplicate { .. } => CatalogError::Duplicate {
            entity,
            detail: detail.to_string(),
        },
        other => other,
    }
}

async fn begin(store: &Store) -> Result<WriteTx, CatalogError> {
    WriteTx::begin(store.pool())
        .await
        .map_err(|e| map_sqlx_error("begin_transaction", e))
}

fn commit_error(e: sqlx::Error) -> CatalogError {
    map_sqlx_error("commit_transaction", e)
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn ingredient_from_row(row: &SqliteRow) -> Result<Ingredient, sqlx::Error> {
    Ok(Ingredient {
        id: IngredientId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        kind: row.try_get("kind")?,
        unit: row.try_get("unit")?,
        quantity: row.try_get("quantity")?,
    })
}

fn client_from_row(row: &SqliteRow) -> Result<Client, sqlx::Error> {
    Ok(Client {
        id: ClientId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
    })
}

fn menu_from_row(row: &SqliteRow, recipe: Recipe) -> Result<Menu, sqlx::Error> {
    Ok(Menu {
        id: MenuId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        recipe,
    })
}

pub(crate) async fn fetch_ingredient(
    conn: &mut SqliteConnection,
    id: IngredientId,
) -> Result<Option<Ingredient>, sqlx::Error> {
    sqlx::query("SELECT id, name, kind, unit, quantity FROM ingredients WHERE id = ?")
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(ingredient_from_row)
        .transpose()
}

async fn fetch_client(
    conn: &mut SqliteConnection,
    id: ClientId,
) -> Result<Option<Client>, sqlx::Error> {
    sqlx::query("SELECT id, name, email FROM clients WHERE id = ?")
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(client_from_row)
        .transpose()
}

async fn fetch_recipe(conn: &mut SqliteConnection, id: MenuId) -> Result<Recipe, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT ingredient_id, quantity FROM menu_recipes WHERE menu_id = ? ORDER BY ingredient_id",
    )
    .bind(id.get())
    .fetch_all(&mut *conn)
    .await?;

    let entries = rows
        .iter()
        .map(|row| -> Result<RecipeEntry, sqlx::Error> {
            Ok(RecipeEntry::new(
                IngredientId::new(row.try_get("ingredient_id")?),
                row.try_get("quantity")?,
            ))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;
    Ok(Recipe::from_stored(entries))
}

/// Menu with its recipe, as stored.
pub(crate) async fn fetch_menu(
    conn: &mut SqliteConnection,
    id: MenuId,
) -> Result<Option<Menu>, sqlx::Error> {
    let row = sqlx::query("SELECT id, name, description, price_cents FROM menus WHERE id = ?")
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let recipe = fetch_recipe(conn, id).await?;
    menu_from_row(&row, recipe).map(Some)
}

async fn count_refs(
    conn: &mut SqliteConnection,
    sql: &str,
    id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(sql).bind(id).fetch_one(&mut *conn).await
}

// ---------------------------------------------------------------------------
// Ingredients
// ---------------------------------------------------------------------------

impl Store {
    /// Register an ingredient with its opening stock.
    #[instrument(skip(self, new), fields(name = %new.name, kind = %new.kind), err)]
    pub async fn create_ingredient(&self, new: &NewIngredient) -> Result<Ingredient, CatalogError> {
        new.validate()?;
        let mut tx = begin(self).await?;
        let result = insert_ingredient(tx.conn(), new).await;
        let ingredient = tx.finish(result, commit_error).await?;
        info!(ingredient_id = %ingredient.id, "ingredient created");
        Ok(ingredient)
    }

    pub async fn get_ingredient(&self, id: IngredientId) -> Result<Option<Ingredient>, CatalogError> {
        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_ingredient(&mut conn, id)
            .await
            .map_err(|e| map_sqlx_error("get_ingredient", e))
    }

    /// All ingredients ordered by name, then kind.
    pub async fn list_ingredients(&self) -> Result<Vec<Ingredient>, CatalogError> {
        sqlx::query("SELECT id, name, kind, unit, quantity FROM ingredients ORDER BY name, kind")
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_ingredients", e))?
            .iter()
            .map(ingredient_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_ingredient", e))
    }

    /// Partial update. A changed quantity is journaled as an adjustment.
    #[instrument(skip(self, update), fields(ingredient_id = %id), err)]
    pub async fn update_ingredient(
        &self,
        id: IngredientId,
        update: &IngredientUpdate,
    ) -> Result<Ingredient, CatalogError> {
        update.validate()?;
        let mut tx = begin(self).await?;
        let result = apply_ingredient_update(tx.conn(), id, update).await;
        tx.finish(result, commit_error).await
    }

    /// Add `amount` to the on-hand quantity.
    #[instrument(skip(self), err)]
    pub async fn restock_ingredient(
        &self,
        id: IngredientId,
        amount: f64,
    ) -> Result<Ingredient, CatalogError> {
        validate_restock(amount)?;
        let mut tx = begin(self).await?;
        let result = restock(tx.conn(), id, amount).await;
        tx.finish(result, commit_error).await
    }

    /// Delete an ingredient; it disappears from every recipe using it.
    #[instrument(skip(self), err)]
    pub async fn delete_ingredient(&self, id: IngredientId) -> Result<(), CatalogError> {
        let deleted = sqlx::query("DELETE FROM ingredients WHERE id = ?")
            .bind(id.get())
            .execute(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_ingredient", e))?;
        if deleted.rows_affected() == 0 {
            return Err(CatalogError::not_found("ingredient", id));
        }
        Ok(())
    }
}

async fn insert_ingredient(
    conn: &mut SqliteConnection,
    new: &NewIngredient,
) -> Result<Ingredient, CatalogError> {
    let detail = format!("{} ({})", new.name, new.kind);
    let inserted = sqlx::query("INSERT INTO ingredients (name, kind, unit, quantity) VALUES (?, ?, ?, ?)")
        .bind(&new.name)
        .bind(&new.kind)
        .bind(&new.unit)
        .bind(new.quantity)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error("insert_ingredient", "ingredient", &detail, e))?;
    let id = IngredientId::new(inserted.last_insert_rowid());

    if new.quantity > 0.0 {
        record_movement(conn, id, None, MovementReason::Initial, new.quantity, now_millis())
            .await
            .map_err(|e| map_sqlx_error("record_movement", e))?;
    }

    Ok(Ingredient {
        id,
        name: new.name.clone(),
        kind: new.kind.clone(),
        unit: new.unit.clone(),
        quantity: new.quantity,
    })
}

async fn apply_ingredient_update(
    conn: &mut SqliteConnection,
    id: IngredientId,
    update: &IngredientUpdate,
) -> Result<Ingredient, CatalogError> {
    let mut ingredient = fetch_ingredient(conn, id)
        .await
        .map_err(|e| map_sqlx_error("load_ingredient", e))?
        .ok_or_else(|| CatalogError::not_found("ingredient", id))?;
    let before = ingredient.quantity;
    update.apply_to(&mut ingredient);

    let detail = format!("{} ({})", ingredient.name, ingredient.kind);
    sqlx::query("UPDATE ingredients SET name = ?, kind = ?, unit = ?, quantity = ? WHERE id = ?")
        .bind(&ingredient.name)
        .bind(&ingredient.kind)
        .bind(&ingredient.unit)
        .bind(ingredient.quantity)
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error("update_ingredient", "ingredient", &detail, e))?;

    let delta = ingredient.quantity - before;
    if delta != 0.0 {
        record_movement(conn, id, None, MovementReason::Adjustment, delta, now_millis())
            .await
            .map_err(|e| map_sqlx_error("record_movement", e))?;
    }
    Ok(ingredient)
}

async fn restock(
    conn: &mut SqliteConnection,
    id: IngredientId,
    amount: f64,
) -> Result<Ingredient, CatalogError> {
    let updated = sqlx::query("UPDATE ingredients SET quantity = quantity + ? WHERE id = ?")
        .bind(amount)
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("restock", e))?;
    if updated.rows_affected() == 0 {
        return Err(CatalogError::not_found("ingredient", id));
    }
    record_movement(conn, id, None, MovementReason::Restock, amount, now_millis())
        .await
        .map_err(|e| map_sqlx_error("record_movement", e))?;

    fetch_ingredient(conn, id)
        .await
        .map_err(|e| map_sqlx_error("load_ingredient", e))?
        .ok_or_else(|| CatalogError::not_found("ingredient", id))
}

// ---------------------------------------------------------------------------
// Menus
// ---------------------------------------------------------------------------

impl Store {
    /// Create a menu and its recipe. Every recipe ingredient must exist.
    #[instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn create_menu(&self, new: &NewMenu) -> Result<Menu, CatalogError> {
        let recipe = new.validate()?;
        let mut tx = begin(self).await?;
        let result = insert_menu(tx.conn(), new, recipe).await;
        let menu = tx.finish(result, commit_error).await?;
        info!(menu_id = %menu.id, "menu created");
        Ok(menu)
    }

    pub async fn get_menu(&self, id: MenuId) -> Result<Option<Menu>, CatalogError> {
        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_menu(&mut conn, id)
            .await
            .map_err(|e| map_sqlx_error("get_menu", e))
    }

    /// All menus with their recipes, ordered by name. Both tables are read
    /// from one snapshot.
    pub async fn list_menus(&self) -> Result<Vec<Menu>, CatalogError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_read", e))?;
        let menu_rows = sqlx::query("SELECT id, name, description, price_cents FROM menus ORDER BY name")
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("list_menus", e))?;
        let recipe_rows = sqlx::query(
            "SELECT menu_id, ingredient_id, quantity FROM menu_recipes ORDER BY menu_id, ingredient_id",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_recipes", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("end_read", e))?;

        let decode = |e| map_sqlx_error("decode_menu", e);
        let mut recipes: BTreeMap<MenuId, Vec<RecipeEntry>> = BTreeMap::new();
        for row in &recipe_rows {
            let menu_id = MenuId::new(row.try_get("menu_id").map_err(decode)?);
            recipes.entry(menu_id).or_default().push(RecipeEntry::new(
                IngredientId::new(row.try_get("ingredient_id").map_err(decode)?),
                row.try_get("quantity").map_err(decode)?,
            ));
        }

        menu_rows
            .iter()
            .map(|row| {
                let id = MenuId::new(row.try_get("id").map_err(decode)?);
                let recipe = Recipe::from_stored(recipes.remove(&id).unwrap_or_default());
                menu_from_row(row, recipe).map_err(decode)
            })
            .collect()
    }

    /// Partial update; a present recipe replaces every recipe link.
    #[instrument(skip(self, update), fields(menu_id = %id), err)]
    pub async fn update_menu(&self, id: MenuId, update: &MenuUpdate) -> Result<Menu, CatalogError> {
        let recipe = update.validate()?;
        let mut tx = begin(self).await?;
        let result = apply_menu_update(tx.conn(), id, update, recipe).await;
        tx.finish(result, commit_error).await
    }

    /// Delete a menu and its recipe. Refused while orders reference it.
    #[instrument(skip(self), err)]
    pub async fn delete_menu(&self, id: MenuId) -> Result<(), CatalogError> {
        let mut tx = begin(self).await?;
        let result = remove_menu(tx.conn(), id).await;
        tx.finish(result, commit_error).await
    }
}

async fn write_recipe(
    conn: &mut SqliteConnection,
    menu_id: MenuId,
    recipe: &Recipe,
) -> Result<(), CatalogError> {
    for entry in recipe.entries() {
        if fetch_ingredient(conn, entry.ingredient_id)
            .await
            .map_err(|e| map_sqlx_error("load_ingredient", e))?
            .is_none()
        {
            return Err(CatalogError::not_found("ingredient", entry.ingredient_id));
        }
        sqlx::query("INSERT INTO menu_recipes (menu_id, ingredient_id, quantity) VALUES (?, ?, ?)")
            .bind(menu_id.get())
            .bind(entry.ingredient_id.get())
            .bind(entry.quantity)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("insert_recipe", e))?;
    }
    Ok(())
}

async fn insert_menu(
    conn: &mut SqliteConnection,
    new: &NewMenu,
    recipe: Recipe,
) -> Result<Menu, CatalogError> {
    let inserted = sqlx::query("INSERT INTO menus (name, description, price_cents) VALUES (?, ?, ?)")
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price.cents())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error("insert_menu", "menu", &new.name, e))?;
    let id = MenuId::new(inserted.last_insert_rowid());
    write_recipe(conn, id, &recipe).await?;

    Ok(Menu {
        id,
        name: new.name.clone(),
        description: new.description.clone(),
        price: new.price,
        recipe,
    })
}

async fn apply_menu_update(
    conn: &mut SqliteConnection,
    id: MenuId,
    update: &MenuUpdate,
    recipe: Option<Recipe>,
) -> Result<Menu, CatalogError> {
    let mut menu = fetch_menu(conn, id)
        .await
        .map_err(|e| map_sqlx_error("load_menu", e))?
        .ok_or_else(|| CatalogError::not_found("menu", id))?;

    if let Some(name) = &update.name {
        menu.name = name.clone();
    }
    if let Some(description) = &update.description {
        menu.description = description.clone();
    }
    if let Some(price) = update.price {
        menu.price = price;
    }

    sqlx::query("UPDATE menus SET name = ?, description = ?, price_cents = ? WHERE id = ?")
        .bind(&menu.name)
        .bind(&menu.description)
        .bind(menu.price.cents())
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error("update_menu", "menu", &menu.name, e))?;

    if let Some(recipe) = recipe {
        sqlx::query("DELETE FROM menu_recipes WHERE menu_id = ?")
            .bind(id.get())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("clear_recipe", e))?;
        write_recipe(conn, id, &recipe).await?;
        menu.recipe = recipe;
    }

    Ok(menu)
}

async fn remove_menu(conn: &mut SqliteConnection, id: MenuId) -> Result<(), CatalogError> {
    let referenced = count_refs(conn, "SELECT COUNT(*) FROM order_lines WHERE menu_id = ?", id.get())
        .await
        .map_err(|e| map_sqlx_error("count_order_lines", e))?;
    if referenced > 0 {
        return Err(CatalogError::InUse {
            entity: "menu",
            id: id.get(),
            referenced_by: "orders",
        });
    }

    let deleted = sqlx::query("DELETE FROM menus WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("delete_menu", e))?;
    if deleted.rows_affected() == 0 {
        return Err(CatalogError::not_found("menu", id));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

impl Store {
    #[instrument(skip(self, new), err)]
    pub async fn create_client(&self, new: &NewClient) -> Result<Client, CatalogError> {
        new.validate()?;
        let inserted = sqlx::query("INSERT INTO clients (name, email) VALUES (?, ?)")
            .bind(&new.name)
            .bind(&new.email)
            .execute(self.pool())
            .await
            .map_err(|e| map_write_error("insert_client", "client", &new.email, e))?;
        let client = Client {
            id: ClientId::new(inserted.last_insert_rowid()),
            name: new.name.clone(),
            email: new.email.clone(),
        };
        info!(client_id = %client.id, "client created");
        Ok(client)
    }

    pub async fn get_client(&self, id: ClientId) -> Result<Option<Client>, CatalogError> {
        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_client(&mut conn, id)
            .await
            .map_err(|e| map_sqlx_error("get_client", e))
    }

    /// All clients ordered by name.
    pub async fn list_clients(&self) -> Result<Vec<Client>, CatalogError> {
        sqlx::query("SELECT id, name, email FROM clients ORDER BY name, id")
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_clients", e))?
            .iter()
            .map(client_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_client", e))
    }

    /// Partial update. Keeping one's own email is not a duplicate.
    #[instrument(skip(self, update), fields(client_id = %id), err)]
    pub async fn update_client(&self, id: ClientId, update: &ClientUpdate) -> Result<Client, CatalogError> {
        update.validate()?;
        let mut tx = begin(self).await?;
        let result = apply_client_update(tx.conn(), id, update).await;
        tx.finish(result, commit_error).await
    }

    /// Delete a client. Refused while the client owns orders.
    #[instrument(skip(self), err)]
    pub async fn delete_client(&self, id: ClientId) -> Result<(), CatalogError> {
        let mut tx = begin(self).await?;
        let result = remove_client(tx.conn(), id).await;
        tx.finish(result, commit_error).await
    }
}

async fn apply_client_update(
    conn: &mut SqliteConnection,
    id: ClientId,
    update: &ClientUpdate,
) -> Result<Client, CatalogError> {
    let mut client = fetch_client(conn, id)
        .await
        .map_err(|e| map_sqlx_error("load_client", e))?
        .ok_or_else(|| CatalogError::not_found("client", id))?;
    if let Some(name) = &update.name {
        client.name = name.clone();
    }
    if let Some(email) = &update.email {
        client.email = email.clone();
    }

    sqlx::query("UPDATE clients SET name = ?, email = ? WHERE id = ?")
        .bind(&client.name)
        .bind(&client.email)
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error("update_client", "client", &client.email, e))?;
    Ok(client)
}

async fn remove_client(conn: &mut SqliteConnection, id: ClientId) -> Result<(), CatalogError> {
    let owned = count_refs(conn, "SELECT COUNT(*) FROM orders WHERE client_id = ?", id.get())
        .await
        .map_err(|e| map_sqlx_error("count_orders", e))?;
    if owned > 0 {
        return Err(CatalogError::InUse {
            entity: "client",
            id: id.get(),
            referenced_by: "orders",
        });
    }

    let deleted = sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("delete_client", e))?;
    if deleted.rows_affected() == 0 {
        return Err(CatalogError::not_found("client", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use comanda_sales::PlacementRequest;

    async fn store() -> Store {
        Store::connect(StoreConfig::in_memory()).await.unwrap()
    }

    fn burger(recipe: Vec<RecipeEntry>) -> NewMenu {
        NewMenu {
            name: "Burger".to_string(),
            description: "Beef burger".to_string(),
            price: Money::from_cents(500),
            recipe,
        }
    }

    #[tokio::test]
    async fn ingredient_crud_round_trip() {
        let store = store().await;
        let bun = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", 10.0))
            .await
            .unwrap();
        assert_eq!(store.get_ingredient(bun.id).await.unwrap(), Some(bun.clone()));

        let updated = store
            .update_ingredient(
                bun.id,
                &IngredientUpdate {
                    unit: Some("piece".to_string()),
                    quantity: Some(12.0),
                    ..IngredientUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.unit, "piece");
        assert_eq!(updated.quantity, 12.0);

        let restocked = store.restock_ingredient(bun.id, 3.0).await.unwrap();
        assert_eq!(restocked.quantity, 15.0);
        assert_eq!(store.movement_total(bun.id).await.unwrap(), 15.0);

        store.delete_ingredient(bun.id).await.unwrap();
        assert_eq!(store.get_ingredient(bun.id).await.unwrap(), None);
        assert!(matches!(
            store.delete_ingredient(bun.id).await,
            Err(CatalogError::NotFound { entity: "ingredient", .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_ingredient_name_and_kind_is_rejected() {
        let store = store().await;
        store
            .create_ingredient(&NewIngredient::new("Tomato", "vegetable", "kg", 1.0))
            .await
            .unwrap();
        // Same name under another kind is fine.
        store
            .create_ingredient(&NewIngredient::new("Tomato", "sauce", "l", 1.0))
            .await
            .unwrap();

        let err = store
            .create_ingredient(&NewIngredient::new("Tomato", "vegetable", "kg", 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { entity: "ingredient", .. }));
    }

    #[tokio::test]
    async fn invalid_ingredient_input_is_rejected() {
        let store = store().await;
        let err = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", -1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));

        let bun = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", 1.0))
            .await
            .unwrap();
        assert!(matches!(
            store.restock_ingredient(bun.id, 0.0).await,
            Err(CatalogError::Invalid(_))
        ));
        assert!(matches!(
            store.restock_ingredient(IngredientId::new(99), 1.0).await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn menu_requires_known_ingredients_and_unique_name() {
        let store = store().await;
        let err = store
            .create_menu(&burger(vec![RecipeEntry::new(IngredientId::new(7), 1.0)]))
            .await
            .unwrap_err();
        assert_eq!(err, CatalogError::not_found("ingredient", IngredientId::new(7)));
        assert!(store.list_menus().await.unwrap().is_empty());

        let bun = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", 10.0))
            .await
            .unwrap();
        store
            .create_menu(&burger(vec![RecipeEntry::new(bun.id, 2.0)]))
            .await
            .unwrap();
        let err = store
            .create_menu(&burger(vec![RecipeEntry::new(bun.id, 1.0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { entity: "menu", .. }));
    }

    #[tokio::test]
    async fn menu_update_replaces_recipe() {
        let store = store().await;
        let bun = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", 10.0))
            .await
            .unwrap();
        let patty = store
            .create_ingredient(&NewIngredient::new("Patty", "meat", "unit", 10.0))
            .await
            .unwrap();
        let menu = store
            .create_menu(&burger(vec![RecipeEntry::new(bun.id, 2.0)]))
            .await
            .unwrap();

        let updated = store
            .update_menu(
                menu.id,
                &MenuUpdate {
                    price: Some(Money::from_cents(650)),
                    recipe: Some(vec![RecipeEntry::new(patty.id, 1.0)]),
                    ..MenuUpdate::default()
                },
            )
            .await
            .unwrap();

        let stored = store.get_menu(menu.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.price, Money::from_cents(650));
        assert_eq!(stored.recipe.quantity_of(bun.id), None);
        assert_eq!(stored.recipe.quantity_of(patty.id), Some(1.0));
    }

    #[tokio::test]
    async fn deleting_an_ingredient_removes_it_from_recipes() {
        let store = store().await;
        let bun = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", 10.0))
            .await
            .unwrap();
        let menu = store
            .create_menu(&burger(vec![RecipeEntry::new(bun.id, 2.0)]))
            .await
            .unwrap();

        store.delete_ingredient(bun.id).await.unwrap();
        let menu = store.get_menu(menu.id).await.unwrap().unwrap();
        assert!(menu.recipe.is_empty());
    }

    #[tokio::test]
    async fn referenced_menu_and_client_cannot_be_deleted() {
        let store = store().await;
        let client = store
            .create_client(&NewClient::new("Ana", "ana@mail.com"))
            .await
            .unwrap();
        let bun = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", 10.0))
            .await
            .unwrap();
        let menu = store
            .create_menu(&burger(vec![RecipeEntry::new(bun.id, 2.0)]))
            .await
            .unwrap();
        store
            .place_order(&PlacementRequest::new(client.id, [(menu.id, 1)]))
            .await
            .unwrap();

        assert!(matches!(
            store.delete_menu(menu.id).await,
            Err(CatalogError::InUse { entity: "menu", .. })
        ));
        assert!(matches!(
            store.delete_client(client.id).await,
            Err(CatalogError::InUse { entity: "client", .. })
        ));
    }

    #[tokio::test]
    async fn client_email_must_be_valid_and_unique() {
        let store = store().await;
        let ana = store
            .create_client(&NewClient::new("Ana", "ana@mail.com"))
            .await
            .unwrap();
        let bob = store
            .create_client(&NewClient::new("Bob", "bob@mail.com"))
            .await
            .unwrap();

        assert!(matches!(
            store.create_client(&NewClient::new("Other", "ana@mail.com")).await,
            Err(CatalogError::Duplicate { entity: "client", .. })
        ));
        assert!(matches!(
            store.create_client(&NewClient::new("Eve", "eve.mail.com")).await,
            Err(CatalogError::Invalid(_))
        ));

        // Re-saving one's own email is allowed.
        let same = store
            .update_client(
                ana.id,
                &ClientUpdate {
                    name: Some("Ana María".to_string()),
                    email: Some("ana@mail.com".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(same.name, "Ana María");

        let err = store
            .update_client(
                bob.id,
                &ClientUpdate {
                    email: Some("ana@mail.com".to_string()),
                    ..ClientUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { .. }));

        store.delete_client(bob.id).await.unwrap();
        let names: Vec<_> = store
            .list_clients()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Ana María"]);
    }
}
