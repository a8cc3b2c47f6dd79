//! Stock ledger decision logic.
//!
//! [`plan_deduction`] is the "check" half of check-and-deduct: given the
//! aggregated requirements of a placement and the on-hand levels read inside the
//! placement transaction, it either returns the full list of deductions to apply
//! or the first shortage. Nothing is mutated here, so a shortage can never leave
//! a partial deduction behind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use comanda_core::IngredientId;

/// Ingredient quantities required by one placement, keyed by ingredient id.
///
/// Backed by an ordered map so iteration (and therefore the first reported
/// shortage) is always ascending by id, independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements(BTreeMap<IngredientId, f64>);

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate `quantity` onto the requirement for `ingredient`.
    pub fn add(&mut self, ingredient: IngredientId, quantity: f64) {
        *self.0.entry(ingredient).or_insert(0.0) += quantity;
    }

    pub fn get(&self, ingredient: IngredientId) -> Option<f64> {
        self.0.get(&ingredient).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Ingredient ids in ascending order.
    pub fn ingredient_ids(&self) -> impl Iterator<Item = IngredientId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IngredientId, f64)> + '_ {
        self.0.iter().map(|(id, qty)| (*id, *qty))
    }
}

impl FromIterator<(IngredientId, f64)> for Requirements {
    fn from_iter<T: IntoIterator<Item = (IngredientId, f64)>>(iter: T) -> Self {
        let mut req = Requirements::new();
        for (id, qty) in iter {
            req.add(id, qty);
        }
        req
    }
}

/// On-hand level of one ingredient as read by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub quantity: f64,
}

/// One ingredient deduction, ready to be applied by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deduction {
    pub ingredient_id: IngredientId,
    pub quantity: f64,
    /// On-hand quantity once the deduction lands.
    pub remaining: f64,
}

/// Not enough stock of one ingredient.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("insufficient stock of {name} (ingredient {ingredient_id}): available {available}, required {required}")]
pub struct Shortage {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub available: f64,
    pub required: f64,
}

/// Name reported for an ingredient that has no stock level on record.
pub const MISSING_INGREDIENT: &str = "<missing>";

/// Display name of `ingredient_id` in `levels`, or [`MISSING_INGREDIENT`].
pub fn level_name(levels: &BTreeMap<IngredientId, StockLevel>, ingredient_id: IngredientId) -> &str {
    levels
        .get(&ingredient_id)
        .map_or(MISSING_INGREDIENT, |level| level.name.as_str())
}

/// Decide the deductions for `requirements` against `levels`.
///
/// Walks requirements in ascending ingredient id and stops at the first
/// ingredient whose on-hand quantity is below the requirement. An ingredient
/// missing from `levels` counts as zero on hand. Empty requirements produce an
/// empty plan.
pub fn plan_deduction(
    requirements: &Requirements,
    levels: &BTreeMap<IngredientId, StockLevel>,
) -> Result<Vec<Deduction>, Shortage> {
    let mut plan = Vec::with_capacity(requirements.len());

    for (ingredient_id, required) in requirements.iter() {
        let available = levels.get(&ingredient_id).map_or(0.0, |level| level.quantity);

        if available < required {
            return Err(Shortage {
                ingredient_id,
                name: level_name(levels, ingredient_id).to_string(),
                available,
                required,
            });
        }

        plan.push(Deduction {
            ingredient_id,
            quantity: required,
            remaining: available - required,
        });
    }

    Ok(plan)
}
