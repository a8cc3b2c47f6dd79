//! Customer receipt for a committed order.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use comanda_core::{MenuId, Money, OrderId};

use crate::order::Order;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    #[error("order {0} has no lines to put on a receipt")]
    Empty(OrderId),

    #[error("order {0} amounts exceed the representable range")]
    Overflow(OrderId),
}

/// Business details printed above and below the line table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptHeader {
    pub name: String,
    pub lines: Vec<String>,
    pub footer: Vec<String>,
}

impl Default for ReceiptHeader {
    fn default() -> Self {
        Self {
            name: "Comanda".to_string(),
            lines: Vec::new(),
            footer: vec!["Thank you for your purchase.".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub menu_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// Rendered view of an order: lines, subtotal, tax and total.
///
/// Amounts come from the unit prices stored on the order, so a receipt printed
/// later still matches what was charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub header: ReceiptHeader,
    pub order_id: OrderId,
    pub client_name: String,
    pub placed_at: DateTime<Utc>,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: Money,
    pub tax_rate_bps: u32,
    pub tax: Money,
    pub total: Money,
}

impl Receipt {
    /// Build the receipt for `order`.
    ///
    /// `menu_names` maps menu ids to display names; unknown ids print as
    /// `menu <id>`.
    pub fn build(
        header: ReceiptHeader,
        order: &Order,
        client_name: impl Into<String>,
        menu_names: &BTreeMap<MenuId, String>,
    ) -> Result<Self, ReceiptError> {
        if order.lines.is_empty() {
            return Err(ReceiptError::Empty(order.id));
        }

        let lines: Vec<ReceiptLine> = order
            .lines
            .iter()
            .map(|line| ReceiptLine {
                menu_name: menu_names
                    .get(&line.menu_id)
                    .cloned()
                    .unwrap_or_else(|| format!("menu {}", line.menu_id)),
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal: line.subtotal(),
            })
            .collect();

        let overflow = || ReceiptError::Overflow(order.id);
        let subtotal = lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.subtotal))
            .ok_or_else(overflow)?;
        let tax = subtotal.portion_bps(order.tax_rate_bps).ok_or_else(overflow)?;
        let total = subtotal.checked_add(tax).ok_or_else(overflow)?;

        Ok(Self {
            header,
            order_id: order.id,
            client_name: client_name.into(),
            placed_at: order.created_at,
            lines,
            subtotal,
            tax_rate_bps: order.tax_rate_bps,
            tax,
            total,
        })
    }

    /// Tax rate as a percentage label, e.g. `19%` or `10.5%`.
    pub fn tax_label(&self) -> String {
        let whole = self.tax_rate_bps / 100;
        let frac = self.tax_rate_bps % 100;
        match frac {
            0 => format!("{whole}%"),
            f if f % 10 == 0 => format!("{whole}.{}%", f / 10),
            f => format!("{whole}.{f:02}%"),
        }
    }
}

const RULE: &str = "------------------------------------------------------------";

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:^60}", self.header.name)?;
        for line in &self.header.lines {
            writeln!(f, "{line:^60}")?;
        }
        writeln!(f)?;
        writeln!(f, "Receipt #: {}", self.order_id)?;
        writeln!(f, "Client: {}", self.client_name)?;
        writeln!(f, "Date: {}", self.placed_at.format("%d/%m/%Y %H:%M:%S"))?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "{:<26}{:>8}{:>13}{:>13}", "Item", "Qty", "Unit", "Subtotal")?;
        writeln!(f, "{RULE}")?;
        for line in &self.lines {
            writeln!(
                f,
                "{:<26}{:>8}{:>13}{:>13}",
                line.menu_name,
                line.quantity,
                line.unit_price.to_string(),
                line.subtotal.to_string()
            )?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "{:>60}", format!("Subtotal: {}", self.subtotal))?;
        writeln!(f, "{:>60}", format!("Tax ({}): {}", self.tax_label(), self.tax))?;
        writeln!(f, "{:>60}", format!("Total: {}", self.total))?;
        if !self.header.footer.is_empty() {
            writeln!(f)?;
            for line in &self.header.footer {
                writeln!(f, "{line:^60}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderLine;
    use chrono::TimeZone;
    use comanda_core::ClientId;

    fn order(lines: Vec<OrderLine>) -> Order {
        let total = lines
            .iter()
            .map(OrderLine::subtotal)
            .try_fold(Money::ZERO, Money::checked_add)
            .unwrap_or(Money::ZERO);
        Order {
            id: OrderId::new(7),
            client_id: ClientId::new(1),
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 13, 45, 0).unwrap(),
            total,
            tax_rate_bps: 1900,
            description: String::new(),
            lines,
        }
    }

    fn names() -> BTreeMap<MenuId, String> {
        [(MenuId::new(1), "Burger".to_string())].into()
    }

    #[test]
    fn computes_tax_and_total() {
        let order = order(vec![OrderLine {
            menu_id: MenuId::new(1),
            quantity: 4,
            unit_price: Money::from_cents(500),
        }]);
        let receipt = Receipt::build(ReceiptHeader::default(), &order, "Ana", &names()).unwrap();

        assert_eq!(receipt.subtotal, Money::from_cents(2000));
        assert_eq!(receipt.tax, Money::from_cents(380));
        assert_eq!(receipt.total, Money::from_cents(2380));
        assert_eq!(receipt.lines[0].menu_name, "Burger");
    }

    #[test]
    fn renders_totals_block() {
        let order = order(vec![
            OrderLine {
                menu_id: MenuId::new(1),
                quantity: 4,
                unit_price: Money::from_cents(500),
            },
            OrderLine {
                menu_id: MenuId::new(5),
                quantity: 1,
                unit_price: Money::from_cents(250),
            },
        ]);
        let text = Receipt::build(ReceiptHeader::default(), &order, "Ana", &names())
            .unwrap()
            .to_string();

        assert!(text.contains("Receipt #: 7"));
        assert!(text.contains("Client: Ana"));
        assert!(text.contains("Date: 05/03/2024 13:45:00"));
        assert!(text.contains("menu 5"));
        assert!(text.contains("Subtotal: $22.50"));
        assert!(text.contains("Tax (19%): $4.28"));
        assert!(text.contains("Total: $26.78"));
        assert!(text.contains("Thank you for your purchase."));
    }

    #[test]
    fn empty_order_has_no_receipt() {
        let err = Receipt::build(ReceiptHeader::default(), &order(Vec::new()), "Ana", &names())
            .unwrap_err();
        assert_eq!(err, ReceiptError::Empty(OrderId::new(7)));
    }

    #[test]
    fn amounts_past_the_cent_range_are_rejected() {
        let huge = |quantity| OrderLine {
            menu_id: MenuId::new(1),
            quantity,
            unit_price: Money::from_cents(i64::MAX / 2),
        };

        // Subtotal overflows.
        let lines = vec![huge(1), huge(1), huge(1)];
        let err = Receipt::build(ReceiptHeader::default(), &order(lines), "Ana", &names())
            .unwrap_err();
        assert_eq!(err, ReceiptError::Overflow(OrderId::new(7)));

        // Subtotal fits, subtotal plus tax does not.
        let lines = vec![huge(1), huge(1)];
        let err = Receipt::build(ReceiptHeader::default(), &order(lines), "Ana", &names())
            .unwrap_err();
        assert_eq!(err, ReceiptError::Overflow(OrderId::new(7)));
    }

    #[test]
    fn tax_label_keeps_fractional_rates() {
        let mut receipt = Receipt::build(
            ReceiptHeader::default(),
            &order(vec![OrderLine {
                menu_id: MenuId::new(1),
                quantity: 1,
                unit_price: Money::from_cents(100),
            }]),
            "Ana",
            &names(),
        )
        .unwrap();

        assert_eq!(receipt.tax_label(), "19%");
        receipt.tax_rate_bps = 1050;
        assert_eq!(receipt.tax_label(), "10.5%");
        receipt.tax_rate_bps = 825;
        assert_eq!(receipt.tax_label(), "8.25%");
    }
}
