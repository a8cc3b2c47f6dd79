//! Committed orders: queries, back-office corrections and receipts.
//!
//! Corrections are catalog-style edits. They do not touch stock, and deleting
//! an order does not restock what it consumed.

use std::collections::BTreeMap;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use tracing::{info, instrument};

use comanda_core::error::require_text;
use comanda_core::{ClientId, DomainError, MenuId, Money, OrderId};
use comanda_sales::{LineRequest, Order, OrderLine, Receipt, ReceiptHeader, validate_request};

use crate::catalog::{CatalogError, map_sqlx_error};
use crate::db::{Store, WriteTx, timestamp_from_millis};

const ORDER_COLUMNS: &str = "id, client_id, created_at_ms, total_cents, tax_rate_bps, description";

fn line_from_row(row: &SqliteRow) -> Result<OrderLine, sqlx::Error> {
    Ok(OrderLine {
        menu_id: MenuId::new(row.try_get("menu_id")?),
        quantity: row.try_get("quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn order_from_row(row: &SqliteRow, lines: Vec<OrderLine>) -> Result<Order, CatalogError> {
    let decode = |e| map_sqlx_error("decode_order", e);
    let id = OrderId::new(row.try_get("id").map_err(decode)?);
    let created_ms: i64 = row.try_get("created_at_ms").map_err(decode)?;
    let bps: i64 = row.try_get("tax_rate_bps").map_err(decode)?;

    Ok(Order {
        id,
        client_id: ClientId::new(row.try_get("client_id").map_err(decode)?),
        created_at: timestamp_from_millis(created_ms).ok_or_else(|| {
            CatalogError::Storage(format!("order {id} has corrupt timestamp {created_ms}"))
        })?,
        total: Money::from_cents(row.try_get("total_cents").map_err(decode)?),
        tax_rate_bps: u32::try_from(bps).map_err(|_| {
            CatalogError::Storage(format!("order {id} has corrupt tax rate {bps}"))
        })?,
        description: row.try_get("description").map_err(decode)?,
        lines,
    })
}

async fn fetch_lines(conn: &mut SqliteConnection, id: OrderId) -> Result<Vec<OrderLine>, sqlx::Error> {
    sqlx::query(
        "SELECT menu_id, quantity, unit_price_cents FROM order_lines WHERE order_id = ? ORDER BY menu_id",
    )
    .bind(id.get())
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(line_from_row)
    .collect()
}

async fn fetch_order(conn: &mut SqliteConnection, id: OrderId) -> Result<Option<Order>, CatalogError> {
    let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_order", e))?;
    let Some(row) = row else {
        return Ok(None);
    };
    let lines = fetch_lines(conn, id)
        .await
        .map_err(|e| map_sqlx_error("load_order_lines", e))?;
    order_from_row(&row, lines).map(Some)
}

impl Store {
    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>, CatalogError> {
        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_order(&mut conn, id).await
    }

    /// Every order, oldest first.
    pub async fn list_orders(&self) -> Result<Vec<Order>, CatalogError> {
        self.load_orders(None).await
    }

    /// Orders of one client, oldest first.
    pub async fn list_orders_by_client(&self, client: ClientId) -> Result<Vec<Order>, CatalogError> {
        if self.get_client(client).await?.is_none() {
            return Err(CatalogError::not_found("client", client));
        }
        self.load_orders(Some(client)).await
    }

    /// Orders and their lines read from one snapshot, so a concurrent line
    /// rewrite is seen entirely or not at all.
    async fn load_orders(&self, client: Option<ClientId>) -> Result<Vec<Order>, CatalogError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_read", e))?;
        let order_rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE (?1 IS NULL OR client_id = ?1) ORDER BY created_at_ms, id"
        ))
        .bind(client.map(ClientId::get))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let line_rows = sqlx::query(
            r#"
            SELECT l.order_id, l.menu_id, l.quantity, l.unit_price_cents
            FROM order_lines l
            JOIN orders o ON o.id = l.order_id
            WHERE (?1 IS NULL OR o.client_id = ?1)
            ORDER BY l.order_id, l.menu_id
            "#,
        )
        .bind(client.map(ClientId::get))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_order_lines", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("end_read", e))?;

        let mut lines: BTreeMap<OrderId, Vec<OrderLine>> = BTreeMap::new();
        for row in &line_rows {
            let order_id: i64 = row
                .try_get("order_id")
                .map_err(|e| map_sqlx_error("decode_order_line", e))?;
            let line = line_from_row(row).map_err(|e| map_sqlx_error("decode_order_line", e))?;
            lines.entry(OrderId::new(order_id)).or_default().push(line);
        }

        order_rows
            .iter()
            .map(|row| {
                let id: i64 = row
                    .try_get("id")
                    .map_err(|e| map_sqlx_error("decode_order", e))?;
                order_from_row(row, lines.remove(&OrderId::new(id)).unwrap_or_default())
            })
            .collect()
    }

    #[instrument(skip(self, description), fields(order_id = %id), err)]
    pub async fn update_order_description(
        &self,
        id: OrderId,
        description: &str,
    ) -> Result<Order, CatalogError> {
        require_text("order description", description)?;
        let updated = sqlx::query("UPDATE orders SET description = ? WHERE id = ?")
            .bind(description.trim())
            .bind(id.get())
            .execute(self.pool())
            .await
            .map_err(|e| map_sqlx_error("update_order_description", e))?;
        if updated.rows_affected() == 0 {
            return Err(CatalogError::not_found("order", id));
        }
        self.get_order(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("order", id))
    }

    /// Replace the lines of an order and recompute its total.
    ///
    /// Menus already on the order keep their recorded unit price; new menus
    /// are charged at the current catalog price. Stock is not re-checked.
    #[instrument(skip(self, lines), fields(order_id = %id, lines = lines.len()), err)]
    pub async fn replace_order_lines(
        &self,
        id: OrderId,
        lines: &[LineRequest],
    ) -> Result<Order, CatalogError> {
        let quantities =
            validate_request(lines).map_err(|e| DomainError::validation(e.to_string()))?;

        let mut tx = WriteTx::begin(self.pool())
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let result = rewrite_lines(tx.conn(), id, &quantities).await;
        let order = tx
            .finish(result, |e| map_sqlx_error("commit_transaction", e))
            .await?;
        info!(order_id = %order.id, total = %order.total, "order lines replaced");
        Ok(order)
    }

    /// Delete an order and its lines. Consumed stock is not returned.
    #[instrument(skip(self), err)]
    pub async fn delete_order(&self, id: OrderId) -> Result<(), CatalogError> {
        let deleted = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id.get())
            .execute(self.pool())
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        if deleted.rows_affected() == 0 {
            return Err(CatalogError::not_found("order", id));
        }
        info!(order_id = %id, "order deleted");
        Ok(())
    }

    /// Receipt for a committed order.
    pub async fn order_receipt(
        &self,
        id: OrderId,
        header: ReceiptHeader,
    ) -> Result<Receipt, CatalogError> {
        let order = self
            .get_order(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("order", id))?;
        let client = self
            .get_client(order.client_id)
            .await?
            .ok_or_else(|| CatalogError::not_found("client", order.client_id))?;

        let mut names = BTreeMap::new();
        for line in &order.lines {
            let name: Option<String> = sqlx::query_scalar("SELECT name FROM menus WHERE id = ?")
                .bind(line.menu_id.get())
                .fetch_optional(self.pool())
                .await
                .map_err(|e| map_sqlx_error("load_menu_name", e))?;
            if let Some(name) = name {
                names.insert(line.menu_id, name);
            }
        }

        Ok(Receipt::build(header, &order, client.name, &names)?)
    }
}

async fn rewrite_lines(
    conn: &mut SqliteConnection,
    id: OrderId,
    quantities: &BTreeMap<MenuId, i64>,
) -> Result<Order, CatalogError> {
    let current = fetch_order(conn, id)
        .await?
        .ok_or_else(|| CatalogError::not_found("order", id))?;
    let recorded: BTreeMap<MenuId, Money> = current
        .lines
        .iter()
        .map(|l| (l.menu_id, l.unit_price))
        .collect();

    let mut lines = Vec::with_capacity(quantities.len());
    let mut total = Money::ZERO;
    for (&menu_id, &quantity) in quantities {
        let unit_price = match recorded.get(&menu_id) {
            Some(price) => *price,
            None => {
                let cents: Option<i64> =
                    sqlx::query_scalar("SELECT price_cents FROM menus WHERE id = ?")
                        .bind(menu_id.get())
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(|e| map_sqlx_error("load_menu_price", e))?;
                Money::from_cents(cents.ok_or_else(|| CatalogError::not_found("menu", menu_id))?)
            }
        };
        total = unit_price
            .checked_times(quantity)
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or_else(|| {
                DomainError::validation(format!("order total overflows at menu {menu_id}"))
            })?;
        lines.push(OrderLine {
            menu_id,
            quantity,
            unit_price,
        });
    }

    sqlx::query("DELETE FROM order_lines WHERE order_id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("clear_order_lines", e))?;
    for line in &lines {
        sqlx::query(
            "INSERT INTO order_lines (order_id, menu_id, quantity, unit_price_cents) VALUES (?, ?, ?, ?)",
        )
        .bind(id.get())
        .bind(line.menu_id.get())
        .bind(line.quantity)
        .bind(line.unit_price.cents())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_order_line", e))?;
    }
    sqlx::query("UPDATE orders SET total_cents = ? WHERE id = ?")
        .bind(total.cents())
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("update_order_total", e))?;

    Ok(Order {
        total,
        lines,
        ..current
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use comanda_clients::NewClient;
    use comanda_core::IngredientId;
    use comanda_inventory::NewIngredient;
    use comanda_menu::{MenuUpdate, NewMenu, RecipeEntry};
    use comanda_sales::{PlacementRequest, ReceiptError};

    struct Fixture {
        store: Store,
        ana: ClientId,
        bob: ClientId,
        bun: IngredientId,
        burger: MenuId,
        fries: MenuId,
    }

    async fn fixture() -> Fixture {
        let store = Store::connect(StoreConfig::in_memory()).await.unwrap();
        let ana = store
            .create_client(&NewClient::new("Ana", "ana@mail.com"))
            .await
            .unwrap()
            .id;
        let bob = store
            .create_client(&NewClient::new("Bob", "bob@mail.com"))
            .await
            .unwrap()
            .id;
        let bun = store
            .create_ingredient(&NewIngredient::new("Bun", "bread", "unit", 100.0))
            .await
            .unwrap()
            .id;
        let potato = store
            .create_ingredient(&NewIngredient::new("Potato", "vegetable", "kg", 100.0))
            .await
            .unwrap()
            .id;
        let menu = |name: &str, cents, ingredient| NewMenu {
            name: name.to_string(),
            description: format!("{name} of the house"),
            price: Money::from_cents(cents),
            recipe: vec![RecipeEntry::new(ingredient, 1.0)],
        };
        let burger = store.create_menu(&menu("Burger", 500, bun)).await.unwrap().id;
        let fries = store.create_menu(&menu("Fries", 300, potato)).await.unwrap().id;
        Fixture {
            store,
            ana,
            bob,
            bun,
            burger,
            fries,
        }
    }

    #[tokio::test]
    async fn lists_orders_by_client() {
        let f = fixture().await;
        let first = f
            .store
            .place_order(&PlacementRequest::new(f.ana, [(f.burger, 1)]))
            .await
            .unwrap();
        f.store
            .place_order(&PlacementRequest::new(f.bob, [(f.fries, 2)]))
            .await
            .unwrap();
        let third = f
            .store
            .place_order(&PlacementRequest::new(f.ana, [(f.burger, 2), (f.fries, 1)]))
            .await
            .unwrap();

        assert_eq!(f.store.list_orders().await.unwrap().len(), 3);
        let anas = f.store.list_orders_by_client(f.ana).await.unwrap();
        assert_eq!(anas, vec![first, third]);
        assert!(matches!(
            f.store.list_orders_by_client(ClientId::new(77)).await,
            Err(CatalogError::NotFound { entity: "client", .. })
        ));
    }

    #[tokio::test]
    async fn replacing_lines_keeps_recorded_prices() {
        let f = fixture().await;
        let order = f
            .store
            .place_order(&PlacementRequest::new(f.ana, [(f.burger, 2)]))
            .await
            .unwrap();
        f.store
            .update_menu(
                f.burger,
                &MenuUpdate {
                    price: Some(Money::from_cents(900)),
                    ..MenuUpdate::default()
                },
            )
            .await
            .unwrap();

        let corrected = f
            .store
            .replace_order_lines(
                order.id,
                &[LineRequest::new(f.burger, 3), LineRequest::new(f.fries, 1)],
            )
            .await
            .unwrap();

        // Burger stays at $5.00, fries at the current $3.00.
        assert_eq!(corrected.total, Money::from_cents(1800));
        assert_eq!(corrected.quantity_of(f.burger), Some(3));
        assert_eq!(f.store.get_order(order.id).await.unwrap(), Some(corrected));

        // Corrections never touch stock.
        let bun = f.store.get_ingredient(f.bun).await.unwrap().unwrap();
        assert_eq!(bun.quantity, 98.0);
    }

    #[tokio::test]
    async fn replacing_lines_validates_input() {
        let f = fixture().await;
        let order = f
            .store
            .place_order(&PlacementRequest::new(f.ana, [(f.burger, 1)]))
            .await
            .unwrap();

        assert!(matches!(
            f.store.replace_order_lines(order.id, &[]).await,
            Err(CatalogError::Invalid(_))
        ));
        assert!(matches!(
            f.store
                .replace_order_lines(order.id, &[LineRequest::new(MenuId::new(99), 1)])
                .await,
            Err(CatalogError::NotFound { entity: "menu", .. })
        ));
        assert!(matches!(
            f.store
                .replace_order_lines(OrderId::new(99), &[LineRequest::new(f.burger, 1)])
                .await,
            Err(CatalogError::NotFound { entity: "order", .. })
        ));
        assert_eq!(f.store.get_order(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn description_can_be_corrected() {
        let f = fixture().await;
        let order = f
            .store
            .place_order(&PlacementRequest::new(f.ana, [(f.burger, 1)]))
            .await
            .unwrap();
        let updated = f
            .store
            .update_order_description(order.id, "  birthday  ")
            .await
            .unwrap();
        assert_eq!(updated.description, "birthday");
        assert!(f.store.update_order_description(order.id, " ").await.is_err());
    }

    #[tokio::test]
    async fn deleting_an_order_does_not_restock() {
        let f = fixture().await;
        let order = f
            .store
            .place_order(&PlacementRequest::new(f.ana, [(f.burger, 4)]))
            .await
            .unwrap();
        f.store.delete_order(order.id).await.unwrap();

        assert_eq!(f.store.get_order(order.id).await.unwrap(), None);
        let bun = f.store.get_ingredient(f.bun).await.unwrap().unwrap();
        assert_eq!(bun.quantity, 96.0);
        assert_eq!(f.store.movement_total(f.bun).await.unwrap(), 96.0);
        assert!(f.store.delete_order(order.id).await.is_err());
    }

    #[tokio::test]
    async fn receipt_uses_client_and_menu_names() {
        let f = fixture().await;
        let order = f
            .store
            .place_order(&PlacementRequest::new(f.ana, [(f.burger, 4), (f.fries, 1)]))
            .await
            .unwrap();

        let receipt = f
            .store
            .order_receipt(order.id, ReceiptHeader::default())
            .await
            .unwrap();
        assert_eq!(receipt.client_name, "Ana");
        assert_eq!(receipt.subtotal, Money::from_cents(2300));
        assert_eq!(receipt.tax, Money::from_cents(437));
        let text = receipt.to_string();
        assert!(text.contains("Burger"));
        assert!(text.contains("Total: $27.37"));
    }

    #[tokio::test]
    async fn receipt_for_order_without_lines_is_refused() {
        let f = fixture().await;
        let order = f
            .store
            .place_order(&PlacementRequest::new(f.ana, [(f.burger, 1)]))
            .await
            .unwrap();
        sqlx::query("DELETE FROM order_lines WHERE order_id = ?")
            .bind(order.id.get())
            .execute(f.store.pool())
            .await
            .unwrap();

        let err = f
            .store
            .order_receipt(order.id, ReceiptHeader::default())
            .await
            .unwrap_err();
        assert_eq!(err, CatalogError::Receipt(ReceiptError::Empty(order.id)));
    }
}
