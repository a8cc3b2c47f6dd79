use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use comanda_core::{ClientId, Entity, MenuId, Money, OrderId};

/// Order line: menu, quantity and the unit price charged at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub menu_id: MenuId,
    pub quantity: i64,
    /// Catalog price when the order was placed.
    pub unit_price: Money,
}

impl OrderLine {
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.unit_price.cents().saturating_mul(self.quantity))
    }
}

/// Committed order.
///
/// Orders only come into existence through placement; afterwards they are
/// read-only except for explicit corrections made by the back office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: ClientId,
    pub created_at: DateTime<Utc>,
    /// Sum of line subtotals, before tax.
    pub total: Money,
    /// Tax rate (basis points) in force when the order was confirmed.
    pub tax_rate_bps: u32,
    pub description: String,
    /// Lines in ascending menu id.
    pub lines: Vec<OrderLine>,
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> OrderId {
        self.id
    }
}

impl Order {
    /// Ordered quantity per menu.
    pub fn quantities(&self) -> BTreeMap<MenuId, i64> {
        self.lines.iter().map(|l| (l.menu_id, l.quantity)).collect()
    }

    pub fn quantity_of(&self, menu: MenuId) -> Option<i64> {
        self.lines
            .iter()
            .find(|l| l.menu_id == menu)
            .map(|l| l.quantity)
    }

    /// Total recomputed from the stored lines.
    pub fn lines_total(&self) -> Money {
        self.lines.iter().map(OrderLine::subtotal).sum()
    }

    /// `None` if the amount does not fit in cents.
    pub fn tax(&self) -> Option<Money> {
        self.total.portion_bps(self.tax_rate_bps)
    }

    pub fn total_with_tax(&self) -> Option<Money> {
        self.total.checked_add(self.tax()?)
    }
}
