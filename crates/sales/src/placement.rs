//! Placement rules: request validation, pricing, errors and the per-attempt
//! state machine.
//!
//! ## Placement flow
//!
//! ```text
//! Validating → Resolving → CheckingStock → Committing → Committed
//!      ↘           ↘             ↘              ↘
//!                          Aborted
//! ```
//!
//! `Aborted` and `Committed` are terminal. Only a `Committed` attempt leaves
//! anything behind in storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use comanda_core::{ClientId, IngredientId, MenuId, Money};
use comanda_inventory::Shortage;
use comanda_menu::Menu;

use crate::order::OrderLine;

/// One requested (menu, quantity) pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub menu_id: MenuId,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(menu_id: MenuId, quantity: i64) -> Self {
        Self { menu_id, quantity }
    }
}

/// Placement request as submitted by a point of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub client_id: ClientId,
    pub lines: Vec<LineRequest>,
    /// Free-text description; generated from the lines when absent.
    pub description: Option<String>,
}

impl PlacementRequest {
    pub fn new(client_id: ClientId, lines: impl IntoIterator<Item = (MenuId, i64)>) -> Self {
        Self {
            client_id,
            lines: lines
                .into_iter()
                .map(|(menu_id, quantity)| LineRequest::new(menu_id, quantity))
                .collect(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Validated quantities per menu; duplicate menus in a request are merged.
pub type OrderQuantities = BTreeMap<MenuId, i64>;

/// Why a placement did not commit.
///
/// Everything except [`PlacementError::TransactionConflict`] and
/// [`PlacementError::Storage`] is a deterministic business failure: retrying
/// with the same input against the same catalog fails the same way.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    #[error("unknown menu {0}")]
    UnknownMenu(MenuId),

    #[error("order has no line items")]
    EmptyOrder,

    #[error("invalid quantity {quantity} for menu {menu_id}")]
    InvalidQuantity { menu_id: MenuId, quantity: i64 },

    #[error("insufficient stock of {name}: available {available}, required {required}")]
    InsufficientStock {
        ingredient_id: IngredientId,
        name: String,
        available: f64,
        required: f64,
    },

    /// The storage layer aborted the transaction because of concurrent access.
    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    /// Infrastructure failure unrelated to contention (I/O, corrupt rows).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl PlacementError {
    /// Only contention is worth retrying without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlacementError::TransactionConflict(_))
    }

    pub fn is_business_rule(&self) -> bool {
        !matches!(
            self,
            PlacementError::TransactionConflict(_) | PlacementError::Storage(_)
        )
    }
}

impl From<Shortage> for PlacementError {
    fn from(s: Shortage) -> Self {
        PlacementError::InsufficientStock {
            ingredient_id: s.ingredient_id,
            name: s.name,
            available: s.available,
            required: s.required,
        }
    }
}

/// Phase of a single placement attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPhase {
    Validating,
    Resolving,
    CheckingStock,
    Committing,
    Committed,
    Aborted,
}

impl PlacementPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlacementPhase::Committed | PlacementPhase::Aborted)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: PlacementPhase) -> bool {
        use PlacementPhase::*;
        match (self, next) {
            (Committed | Aborted, _) => false,
            (_, Aborted) => true,
            (Validating, Resolving)
            | (Resolving, CheckingStock)
            | (CheckingStock, Committing)
            | (Committing, Committed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlacementPhase::Validating => "validating",
            PlacementPhase::Resolving => "resolving",
            PlacementPhase::CheckingStock => "checking_stock",
            PlacementPhase::Committing => "committing",
            PlacementPhase::Committed => "committed",
            PlacementPhase::Aborted => "aborted",
        }
    }
}

impl core::fmt::Display for PlacementPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject empty requests and non-positive quantities, then merge duplicates.
pub fn validate_request(lines: &[LineRequest]) -> Result<OrderQuantities, PlacementError> {
    if lines.is_empty() {
        return Err(PlacementError::EmptyOrder);
    }

    let mut merged = OrderQuantities::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(PlacementError::InvalidQuantity {
                menu_id: line.menu_id,
                quantity: line.quantity,
            });
        }
        let slot = merged.entry(line.menu_id).or_insert(0);
        *slot = slot
            .checked_add(line.quantity)
            .ok_or(PlacementError::InvalidQuantity {
                menu_id: line.menu_id,
                quantity: line.quantity,
            })?;
    }
    Ok(merged)
}

/// Price the order from catalog prices.
///
/// Returns the lines (ascending menu id, with the unit price snapshot) and the
/// pre-tax total.
pub fn price_lines(
    quantities: &OrderQuantities,
    menus: &BTreeMap<MenuId, Menu>,
) -> Result<(Vec<OrderLine>, Money), PlacementError> {
    let mut lines = Vec::with_capacity(quantities.len());
    let mut total = Money::ZERO;

    for (&menu_id, &quantity) in quantities {
        let menu = menus
            .get(&menu_id)
            .ok_or(PlacementError::UnknownMenu(menu_id))?;
        total = menu
            .price
            .checked_times(quantity)
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or(PlacementError::InvalidQuantity { menu_id, quantity })?;
        lines.push(OrderLine {
            menu_id,
            quantity,
            unit_price: menu.price,
        });
    }

    Ok((lines, total))
}

/// Human-readable summary such as `"4x Burger, 1x Fries"`.
pub fn describe_lines(lines: &[OrderLine], menus: &BTreeMap<MenuId, Menu>) -> String {
    lines
        .iter()
        .map(|line| match menus.get(&line.menu_id) {
            Some(menu) => format!("{}x {}", line.quantity, menu.name),
            None => format!("{}x menu {}", line.quantity, line.menu_id),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
