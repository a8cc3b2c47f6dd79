//! Stock ledger storage: on-hand reads, guarded deductions and the movement
//! journal.
//!
//! Every change to `ingredients.quantity` goes through this module together
//! with a `stock_movements` row, so for any ingredient the sum of its recorded
//! deltas equals its current quantity.

use std::collections::BTreeMap;

use sqlx::Row;
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, instrument};

use comanda_core::{IngredientId, OrderId};
use comanda_inventory::{Deduction, Requirements, StockLevel, level_name, plan_deduction};
use comanda_sales::PlacementError;

use crate::db::{Store, WriteTx, now_millis};
use crate::placement::map_sqlx_error;

/// Why a stock movement happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MovementReason {
    /// Quantity the ingredient was created with.
    Initial,
    /// Consumed by a committed order.
    Order,
    Restock,
    /// Manual correction of the on-hand quantity.
    Adjustment,
    /// Direct ledger deduction outside an order.
    Deduction,
}

impl MovementReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementReason::Initial => "initial",
            MovementReason::Order => "order",
            MovementReason::Restock => "restock",
            MovementReason::Adjustment => "adjustment",
            MovementReason::Deduction => "deduction",
        }
    }
}

pub(crate) async fn record_movement(
    conn: &mut SqliteConnection,
    ingredient_id: IngredientId,
    order_id: Option<OrderId>,
    reason: MovementReason,
    delta: f64,
    at_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (ingredient_id, order_id, reason, delta, created_at_ms)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(ingredient_id.get())
    .bind(order_id.map(OrderId::get))
    .bind(reason.as_str())
    .bind(delta)
    .bind(at_ms)
    .execute(conn)
    .await?;
    Ok(())
}

/// Current levels of the required ingredients. Unknown ids are left out.
pub(crate) async fn load_levels(
    conn: &mut SqliteConnection,
    ids: impl Iterator<Item = IngredientId>,
) -> Result<BTreeMap<IngredientId, StockLevel>, sqlx::Error> {
    let mut levels = BTreeMap::new();
    for id in ids {
        let row = sqlx::query("SELECT name, quantity FROM ingredients WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(row) = row {
            levels.insert(
                id,
                StockLevel {
                    ingredient_id: id,
                    name: row.try_get("name")?,
                    quantity: row.try_get("quantity")?,
                },
            );
        }
    }
    Ok(levels)
}

/// Check every requirement against on-hand stock and deduct all of them, or
/// none.
///
/// Must run inside a write transaction. The UPDATE repeats the availability
/// check so storage never goes negative even if the read was stale.
pub(crate) async fn check_and_deduct(
    conn: &mut SqliteConnection,
    requirements: &Requirements,
) -> Result<Vec<Deduction>, PlacementError> {
    if requirements.is_empty() {
        return Ok(Vec::new());
    }

    let levels = load_levels(conn, requirements.ingredient_ids())
        .await
        .map_err(|e| map_sqlx_error("load_levels", e))?;
    let plan = plan_deduction(requirements, &levels)?;

    for deduction in &plan {
        let applied = sqlx::query(
            "UPDATE ingredients SET quantity = quantity - ? WHERE id = ? AND quantity >= ?",
        )
        .bind(deduction.quantity)
        .bind(deduction.ingredient_id.get())
        .bind(deduction.quantity)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("deduct_stock", e))?;

        if applied.rows_affected() == 0 {
            let available = deduction.remaining + deduction.quantity;
            return Err(PlacementError::InsufficientStock {
                ingredient_id: deduction.ingredient_id,
                name: level_name(&levels, deduction.ingredient_id).to_string(),
                available,
                required: deduction.quantity,
            });
        }
        debug!(
            ingredient_id = %deduction.ingredient_id,
            quantity = deduction.quantity,
            remaining = deduction.remaining,
            "stock deducted"
        );
    }

    Ok(plan)
}

impl Store {
    /// Deduct `requirements` from stock in one transaction, outside any order.
    ///
    /// Either every ingredient is decremented or none is; the first short
    /// ingredient by ascending id is reported.
    #[instrument(skip(self, requirements), fields(ingredients = requirements.len()), err)]
    pub async fn check_and_deduct(
        &self,
        requirements: &Requirements,
    ) -> Result<Vec<Deduction>, PlacementError> {
        let mut tx = WriteTx::begin(self.pool())
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let result = deduct_and_record(tx.conn(), requirements).await;
        tx.finish(result, |e| map_sqlx_error("commit_transaction", e))
            .await
    }

    /// Sum of recorded movement deltas for one ingredient.
    pub async fn movement_total(&self, ingredient: IngredientId) -> Result<f64, PlacementError> {
        sqlx::query_scalar::<_, f64>(
            "SELECT COALESCE(SUM(delta), 0.0) FROM stock_movements WHERE ingredient_id = ?",
        )
        .bind(ingredient.get())
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_sqlx_error("movement_total", e))
    }
}

async fn deduct_and_record(
    conn: &mut SqliteConnection,
    requirements: &Requirements,
) -> Result<Vec<Deduction>, PlacementError> {
    let plan = check_and_deduct(conn, requirements).await?;
    let at = now_millis();
    for d in &plan {
        record_movement(conn, d.ingredient_id, None, MovementReason::Deduction, -d.quantity, at)
            .await
            .map_err(|e| map_sqlx_error("record_movement", e))?;
    }
    Ok(plan)
}
