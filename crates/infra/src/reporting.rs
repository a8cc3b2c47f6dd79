//! Read-only reports over committed orders and stock.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::Row;
use tracing::instrument;

use comanda_core::{DomainError, IngredientId, MenuId, Money};
use comanda_inventory::StockLevel;

use crate::catalog::{CatalogError, map_sqlx_error};
use crate::db::{Store, timestamp_from_millis};
use crate::ledger::MovementReason;

/// Orders and pre-tax revenue for one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySales {
    pub day: NaiveDate,
    pub orders: u64,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuSales {
    pub menu_id: MenuId,
    pub name: String,
    pub quantity: i64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientUsage {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub unit: String,
    pub used: f64,
}

fn start_of_day_ms(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// SQLite treats a negative LIMIT as no limit.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

impl Store {
    /// Sales per UTC day, ascending, for days in `from..=to` (either bound may
    /// be open). Days without orders are omitted.
    #[instrument(skip(self), err)]
    pub async fn sales_by_day(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailySales>, CatalogError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(DomainError::validation(format!(
                    "report range starts after it ends: {from} > {to}"
                ))
                .into());
            }
        }
        let lower = from.map(start_of_day_ms);
        let upper = to.and_then(|d| d.succ_opt()).map(start_of_day_ms);

        let rows = sqlx::query(
            r#"
            SELECT created_at_ms, total_cents FROM orders
            WHERE (?1 IS NULL OR created_at_ms >= ?1)
              AND (?2 IS NULL OR created_at_ms < ?2)
            "#,
        )
        .bind(lower)
        .bind(upper)
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("sales_by_day", e))?;

        let mut days: BTreeMap<NaiveDate, (u64, Money)> = BTreeMap::new();
        for row in &rows {
            let ms: i64 = row
                .try_get("created_at_ms")
                .map_err(|e| map_sqlx_error("decode_sales", e))?;
            let cents: i64 = row
                .try_get("total_cents")
                .map_err(|e| map_sqlx_error("decode_sales", e))?;
            let day = timestamp_from_millis(ms)
                .ok_or_else(|| CatalogError::Storage(format!("corrupt order timestamp {ms}")))?
                .date_naive();
            let entry = days.entry(day).or_insert((0, Money::ZERO));
            entry.0 += 1;
            entry.1 = entry
                .1
                .checked_add(Money::from_cents(cents))
                .ok_or_else(|| CatalogError::Storage(format!("sales total for {day} overflows")))?;
        }

        Ok(days
            .into_iter()
            .map(|(day, (orders, total))| DailySales { day, orders, total })
            .collect())
    }

    /// Menus by total quantity sold, descending; ties broken by name.
    #[instrument(skip(self), err)]
    pub async fn best_selling_menus(&self, limit: Option<usize>) -> Result<Vec<MenuSales>, CatalogError> {
        let rows = sqlx::query(
            r#"
            SELECT m.id AS menu_id,
                   m.name AS name,
                   SUM(l.quantity) AS quantity,
                   SUM(l.quantity * l.unit_price_cents) AS revenue_cents
            FROM order_lines l
            JOIN menus m ON m.id = l.menu_id
            GROUP BY m.id, m.name
            ORDER BY quantity DESC, m.name ASC
            LIMIT ?
            "#,
        )
        .bind(sql_limit(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("best_selling_menus", e))?;

        rows.iter()
            .map(|row| -> Result<MenuSales, sqlx::Error> {
                Ok(MenuSales {
                    menu_id: MenuId::new(row.try_get("menu_id")?),
                    name: row.try_get("name")?,
                    quantity: row.try_get("quantity")?,
                    revenue: Money::from_cents(row.try_get("revenue_cents")?),
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_menu_sales", e))
    }

    /// Ingredients by quantity consumed by orders, descending; ties broken by
    /// name.
    #[instrument(skip(self), err)]
    pub async fn most_used_ingredients(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<IngredientUsage>, CatalogError> {
        let rows = sqlx::query(
            r#"
            SELECT i.id AS ingredient_id,
                   i.name AS name,
                   i.unit AS unit,
                   -SUM(s.delta) AS used
            FROM stock_movements s
            JOIN ingredients i ON i.id = s.ingredient_id
            WHERE s.reason = ?
            GROUP BY i.id, i.name, i.unit
            ORDER BY used DESC, i.name ASC
            LIMIT ?
            "#,
        )
        .bind(MovementReason::Order.as_str())
        .bind(sql_limit(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("most_used_ingredients", e))?;

        rows.iter()
            .map(|row| -> Result<IngredientUsage, sqlx::Error> {
                Ok(IngredientUsage {
                    ingredient_id: IngredientId::new(row.try_get("ingredient_id")?),
                    name: row.try_get("name")?,
                    unit: row.try_get("unit")?,
                    used: row.try_get("used")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_ingredient_usage", e))
    }

    /// Current on-hand quantity of every ingredient, by name.
    pub async fn stock_levels(&self) -> Result<Vec<StockLevel>, CatalogError> {
        let rows = sqlx::query("SELECT id, name, quantity FROM ingredients ORDER BY name, id")
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("stock_levels", e))?;

        rows.iter()
            .map(|row| -> Result<StockLevel, sqlx::Error> {
                Ok(StockLevel {
                    ingredient_id: IngredientId::new(row.try_get("id")?),
                    name: row.try_get("name")?,
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_stock_level", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use chrono::{TimeZone, Utc};
    use comanda_clients::NewClient;
    use comanda_core::{ClientId, OrderId};
    use comanda_inventory::NewIngredient;
    use comanda_menu::{NewMenu, RecipeEntry};
    use comanda_sales::PlacementRequest;

    struct Fixture {
        store: Store,
        client: ClientId,
        bun: IngredientId,
        cheese: IngredientId,
        burger: MenuId,
        toast: MenuId,
    }

    async fn fixture() -> Fixture {
        let store = Store::connect(StoreConfig::in_memory()).await.unwrap();
        let client = store
            .create_client(&NewClient::new("Ana", "ana@mail.com"))
            .await
            .unwrap()
            .id;
        let bun = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", 100.0))
            .await
            .unwrap()
            .id;
        let cheese = store
            .create_ingredient(&NewIngredient::new("Cheese", "dairy", "slice", 100.0))
            .await
            .unwrap()
            .id;
        let burger = store
            .create_menu(&NewMenu {
                name: "Burger".to_string(),
                description: "Beef burger".to_string(),
                price: Money::from_cents(500),
                recipe: vec![RecipeEntry::new(bun, 2.0), RecipeEntry::new(cheese, 1.0)],
            })
            .await
            .unwrap()
            .id;
        let toast = store
            .create_menu(&NewMenu {
                name: "Toast".to_string(),
                description: "Cheese toast".to_string(),
                price: Money::from_cents(250),
                recipe: vec![RecipeEntry::new(cheese, 2.0)],
            })
            .await
            .unwrap()
            .id;
        Fixture {
            store,
            client,
            bun,
            cheese,
            burger,
            toast,
        }
    }

    async fn backdate(store: &Store, order: OrderId, y: i32, m: u32, d: u32) {
        let ms = Utc
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .unwrap()
            .timestamp_millis();
        sqlx::query("UPDATE orders SET created_at_ms = ? WHERE id = ?")
            .bind(ms)
            .bind(order.get())
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn groups_sales_by_day_within_range() {
        let f = fixture().await;
        let mut ids = Vec::new();
        for qty in [1, 2, 3] {
            let order = f
                .store
                .place_order(&PlacementRequest::new(f.client, [(f.burger, qty)]))
                .await
                .unwrap();
            ids.push(order.id);
        }
        backdate(&f.store, ids[0], 2024, 5, 1).await;
        backdate(&f.store, ids[1], 2024, 5, 1).await;
        backdate(&f.store, ids[2], 2024, 5, 3).await;

        let all = f.store.sales_by_day(None, None).await.unwrap();
        assert_eq!(
            all,
            vec![
                DailySales {
                    day: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                    orders: 2,
                    total: Money::from_cents(1500),
                },
                DailySales {
                    day: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                    orders: 1,
                    total: Money::from_cents(1500),
                },
            ]
        );

        let first_day = f
            .store
            .sales_by_day(
                NaiveDate::from_ymd_opt(2024, 5, 1),
                NaiveDate::from_ymd_opt(2024, 5, 2),
            )
            .await
            .unwrap();
        assert_eq!(first_day.len(), 1);
        assert_eq!(first_day[0].orders, 2);

        assert!(matches!(
            f.store
                .sales_by_day(
                    NaiveDate::from_ymd_opt(2024, 5, 3),
                    NaiveDate::from_ymd_opt(2024, 5, 1)
                )
                .await,
            Err(CatalogError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn daily_total_past_the_cent_range_is_a_storage_error() {
        let f = fixture().await;
        for _ in 0..2 {
            let order = f
                .store
                .place_order(&PlacementRequest::new(f.client, [(f.burger, 1)]))
                .await
                .unwrap();
            backdate(&f.store, order.id, 2024, 5, 1).await;
        }
        sqlx::query("UPDATE orders SET total_cents = ?")
            .bind(i64::MAX / 2 + 1)
            .execute(f.store.pool())
            .await
            .unwrap();

        let err = f.store.sales_by_day(None, None).await.unwrap_err();
        assert!(matches!(err, CatalogError::Storage(msg) if msg.contains("2024-05-01")));
    }

    #[tokio::test]
    async fn ranks_menus_by_quantity_then_name() {
        let f = fixture().await;
        f.store
            .place_order(&PlacementRequest::new(f.client, [(f.burger, 2), (f.toast, 2)]))
            .await
            .unwrap();

        let ranking = f.store.best_selling_menus(None).await.unwrap();
        let names: Vec<_> = ranking.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Burger", "Toast"]);
        assert_eq!(ranking[0].revenue, Money::from_cents(1000));

        f.store
            .place_order(&PlacementRequest::new(f.client, [(f.toast, 1)]))
            .await
            .unwrap();
        let top = f.store.best_selling_menus(Some(1)).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].menu_id, f.toast);
        assert_eq!(top[0].quantity, 3);
    }

    #[tokio::test]
    async fn ranks_ingredients_by_consumption() {
        let f = fixture().await;
        f.store
            .place_order(&PlacementRequest::new(f.client, [(f.burger, 3), (f.toast, 1)]))
            .await
            .unwrap();
        // Restocks are not consumption.
        f.store.restock_ingredient(f.bun, 50.0).await.unwrap();

        let usage = f.store.most_used_ingredients(None).await.unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].ingredient_id, f.bun);
        assert_eq!(usage[0].used, 6.0);
        assert_eq!(usage[1].ingredient_id, f.cheese);
        assert_eq!(usage[1].used, 5.0);
    }

    #[tokio::test]
    async fn stock_levels_reflect_deductions() {
        let f = fixture().await;
        f.store
            .place_order(&PlacementRequest::new(f.client, [(f.burger, 10)]))
            .await
            .unwrap();

        let levels = f.store.stock_levels().await.unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].name, "Bun");
        assert_eq!(levels[0].quantity, 80.0);
        assert_eq!(levels[1].quantity, 90.0);
    }
}
