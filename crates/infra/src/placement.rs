//! Order placement engine on SQLite.
//!
//! One placement is one `BEGIN IMMEDIATE` transaction: the client check, menu
//! and recipe reads, stock check, guarded deductions, order rows and movement
//! journal all happen under the database write lock, and either all of it
//! commits or none of it does.
//!
//! ## Logging
//!
//! Each attempt gets a UUIDv7 `attempt_id`. Phase transitions are logged at
//! `debug`, business rejections and conflicts at `warn`, storage failures at
//! `error` and commits at `info`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use tracing::{Span, debug, error, info, instrument, warn};
use uuid::Uuid;

use comanda_core::{ClientId, MenuId, OrderId, index_by_id};
use comanda_menu::Menu;
use comanda_sales::{
    Order, OrderQuantities, PlacementError, PlacementPhase, PlacementRequest, describe_lines,
    price_lines, resolve, validate_request,
};

use crate::catalog::fetch_menu;
use crate::db::{SqlFailure, Store, WriteTx, classify, timestamp_from_millis};
use crate::ledger::{self, MovementReason, record_movement};

/// Anything that can place orders.
#[async_trait]
pub trait PlacementEngine: Send + Sync {
    async fn place_order(&self, request: &PlacementRequest) -> Result<Order, PlacementError>;
}

#[async_trait]
impl PlacementEngine for Store {
    async fn place_order(&self, request: &PlacementRequest) -> Result<Order, PlacementError> {
        Store::place_order(self, request).await
    }
}

/// Map SQLx errors to placement errors: lock contention is a conflict,
/// everything else is a storage failure.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PlacementError {
    match classify(operation, &err) {
        SqlFailure::Busy(msg) => PlacementError::TransactionConflict(msg),
        SqlFailure::Unique(msg)
        | SqlFailure::ForeignKey(msg)
        | SqlFailure::Check(msg)
        | SqlFailure::Other(msg) => PlacementError::Storage(msg),
    }
}

/// Phase tracker for one attempt.
struct Attempt {
    id: Uuid,
    phase: PlacementPhase,
}

impl Attempt {
    fn start() -> Self {
        let id = Uuid::now_v7();
        debug!(attempt_id = %id, phase = %PlacementPhase::Validating, "placement started");
        Self {
            id,
            phase: PlacementPhase::Validating,
        }
    }

    fn advance(&mut self, next: PlacementPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal placement transition {} -> {}",
            self.phase,
            next
        );
        debug!(attempt_id = %self.id, from = %self.phase, to = %next, "placement transition");
        self.phase = next;
    }

    fn abort(&mut self, err: PlacementError) -> PlacementError {
        let failed_in = self.phase;
        self.advance(PlacementPhase::Aborted);
        if err.is_retryable() {
            warn!(attempt_id = %self.id, phase = %failed_in, error = %err, "placement conflicted");
        } else if err.is_business_rule() {
            warn!(attempt_id = %self.id, phase = %failed_in, error = %err, "placement rejected");
        } else {
            error!(attempt_id = %self.id, phase = %failed_in, error = %err, "placement failed");
        }
        err
    }
}

impl Store {
    /// Place an order: validate, resolve, check and deduct stock, and persist
    /// the order with its lines and stock movements as one transaction.
    ///
    /// Never retries. A [`PlacementError::TransactionConflict`] means nothing
    /// was written and the same request may be submitted again.
    #[instrument(
        skip(self, request),
        fields(
            client_id = %request.client_id,
            lines = request.lines.len(),
            attempt_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn place_order(&self, request: &PlacementRequest) -> Result<Order, PlacementError> {
        let mut attempt = Attempt::start();
        Span::current().record("attempt_id", tracing::field::display(attempt.id));

        let quantities = validate_request(&request.lines).map_err(|e| attempt.abort(e))?;

        let mut tx = match WriteTx::begin(self.pool()).await {
            Ok(tx) => tx,
            Err(e) => return Err(attempt.abort(map_sqlx_error("begin_transaction", e))),
        };

        let result = place_in_tx(
            tx.conn(),
            &mut attempt,
            request,
            &quantities,
            self.config().tax_rate_bps,
        )
        .await;
        let result = tx
            .finish(result, |e| map_sqlx_error("commit_transaction", e))
            .await;

        match result {
            Ok(order) => {
                attempt.advance(PlacementPhase::Committed);
                info!(
                    attempt_id = %attempt.id,
                    order_id = %order.id,
                    client_id = %order.client_id,
                    total = %order.total,
                    "order placed"
                );
                Ok(order)
            }
            Err(e) => Err(attempt.abort(e)),
        }
    }
}

async fn place_in_tx(
    conn: &mut SqliteConnection,
    attempt: &mut Attempt,
    request: &PlacementRequest,
    quantities: &OrderQuantities,
    tax_rate_bps: u32,
) -> Result<Order, PlacementError> {
    ensure_client(conn, request.client_id).await?;

    attempt.advance(PlacementPhase::Resolving);
    let menus = load_menus(conn, quantities.keys().copied()).await?;
    let requirements = resolve(quantities.iter().map(|(m, q)| (*m, *q)), &menus)?;
    let (lines, total) = price_lines(quantities, &menus)?;

    attempt.advance(PlacementPhase::CheckingStock);
    let deductions = ledger::check_and_deduct(conn, &requirements).await?;

    attempt.advance(PlacementPhase::Committing);
    let created_ms = Utc::now().timestamp_millis();
    let created_at = timestamp_from_millis(created_ms)
        .ok_or_else(|| PlacementError::Storage(format!("clock out of range: {created_ms}")))?;
    let description = request
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| describe_lines(&lines, &menus));

    let inserted = sqlx::query(
        r#"
        INSERT INTO orders (client_id, created_at_ms, total_cents, tax_rate_bps, description)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(request.client_id.get())
    .bind(created_ms)
    .bind(total.cents())
    .bind(i64::from(tax_rate_bps))
    .bind(&description)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_order", e))?;
    let order_id = OrderId::new(inserted.last_insert_rowid());

    for line in &lines {
        sqlx::query(
            "INSERT INTO order_lines (order_id, menu_id, quantity, unit_price_cents) VALUES (?, ?, ?, ?)",
        )
        .bind(order_id.get())
        .bind(line.menu_id.get())
        .bind(line.quantity)
        .bind(line.unit_price.cents())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_order_line", e))?;
    }

    for d in &deductions {
        record_movement(
            conn,
            d.ingredient_id,
            Some(order_id),
            MovementReason::Order,
            -d.quantity,
            created_ms,
        )
        .await
        .map_err(|e| map_sqlx_error("record_movement", e))?;
    }

    Ok(Order {
        id: order_id,
        client_id: request.client_id,
        created_at,
        total,
        tax_rate_bps,
        description,
        lines,
    })
}

async fn ensure_client(conn: &mut SqliteConnection, client_id: ClientId) -> Result<(), PlacementError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM clients WHERE id = ?")
        .bind(client_id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_client", e))?;
    match found {
        Some(_) => Ok(()),
        None => Err(PlacementError::UnknownClient(client_id)),
    }
}

/// Requested menus with their recipes; unknown ids are left out for the
/// resolver to report.
async fn load_menus(
    conn: &mut SqliteConnection,
    ids: impl Iterator<Item = MenuId>,
) -> Result<BTreeMap<MenuId, Menu>, PlacementError> {
    let mut found = Vec::new();
    for id in ids {
        if let Some(menu) = fetch_menu(conn, id)
            .await
            .map_err(|e| map_sqlx_error("load_menu", e))?
        {
            found.push(menu);
        }
    }
    Ok(index_by_id(found))
}
