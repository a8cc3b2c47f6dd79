use serde::{Deserialize, Serialize};

use comanda_core::error::require_text;
use comanda_core::{DomainError, DomainResult, Entity, IngredientId};

/// Ingredient: a stock-keeping unit consumed by menus.
///
/// `(name, kind)` is unique across the catalog; storage enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    /// Category, e.g. "bread" or "dairy".
    pub kind: String,
    /// Unit of measure, e.g. "units" or "kg".
    pub unit: String,
    /// On-hand quantity. Never negative after a committed transaction.
    pub quantity: f64,
}

impl Entity for Ingredient {
    type Id = IngredientId;

    fn id(&self) -> IngredientId {
        self.id
    }
}

/// Payload for creating an ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub kind: String,
    pub unit: String,
    pub quantity: f64,
}

impl NewIngredient {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        unit: impl Into<String>,
        quantity: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            unit: unit.into(),
            quantity,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        require_text("ingredient name", &self.name)?;
        require_text("ingredient kind", &self.kind)?;
        require_text("ingredient unit", &self.unit)?;
        validate_on_hand(self.quantity)
    }
}

/// Partial update of an ingredient; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientUpdate {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub unit: Option<String>,
    pub quantity: Option<f64>,
}

impl IngredientUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            require_text("ingredient name", name)?;
        }
        if let Some(kind) = &self.kind {
            require_text("ingredient kind", kind)?;
        }
        if let Some(unit) = &self.unit {
            require_text("ingredient unit", unit)?;
        }
        if let Some(quantity) = self.quantity {
            validate_on_hand(quantity)?;
        }
        Ok(())
    }

    /// Apply the update to an existing ingredient.
    pub fn apply_to(&self, ingredient: &mut Ingredient) {
        if let Some(name) = &self.name {
            ingredient.name = name.clone();
        }
        if let Some(kind) = &self.kind {
            ingredient.kind = kind.clone();
        }
        if let Some(unit) = &self.unit {
            ingredient.unit = unit.clone();
        }
        if let Some(quantity) = self.quantity {
            ingredient.quantity = quantity;
        }
    }
}

/// On-hand quantities must be finite and non-negative.
pub fn validate_on_hand(quantity: f64) -> DomainResult<()> {
    if !quantity.is_finite() {
        return Err(DomainError::validation("ingredient quantity must be a finite number"));
    }
    if quantity < 0.0 {
        return Err(DomainError::validation("ingredient quantity cannot be negative"));
    }
    Ok(())
}

/// Restock amounts must be finite and strictly positive.
pub fn validate_restock(amount: f64) -> DomainResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(DomainError::validation("restock amount must be greater than zero"));
    }
    Ok(())
}
