use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use comanda_core::error::require_text;
use comanda_core::{DomainError, DomainResult, Entity, IngredientId, MenuId, Money, ValueObject};

/// One recipe line: quantity of an ingredient consumed per unit of a menu.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeEntry {
    pub ingredient_id: IngredientId,
    pub quantity: f64,
}

impl ValueObject for RecipeEntry {}

impl RecipeEntry {
    pub fn new(ingredient_id: IngredientId, quantity: f64) -> Self {
        Self {
            ingredient_id,
            quantity,
        }
    }
}

/// Recipe of a menu, keyed by ingredient id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe(BTreeMap<IngredientId, f64>);

impl Recipe {
    /// Build a validated recipe.
    ///
    /// Requires at least one entry, each with a finite quantity greater than
    /// zero, and no ingredient listed twice.
    pub fn new(entries: impl IntoIterator<Item = RecipeEntry>) -> DomainResult<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if !entry.quantity.is_finite() || entry.quantity <= 0.0 {
                return Err(DomainError::validation(format!(
                    "recipe quantity for ingredient {} must be greater than zero",
                    entry.ingredient_id
                )));
            }
            if map.insert(entry.ingredient_id, entry.quantity).is_some() {
                return Err(DomainError::validation(format!(
                    "ingredient {} appears more than once in the recipe",
                    entry.ingredient_id
                )));
            }
        }
        if map.is_empty() {
            return Err(DomainError::validation(
                "a menu needs at least one ingredient in its recipe",
            ));
        }
        Ok(Self(map))
    }

    /// Rebuild a recipe from persisted rows without validation.
    ///
    /// Persisted recipes may have lost entries when an ingredient was deleted,
    /// so this accepts an empty set.
    pub fn from_stored(entries: impl IntoIterator<Item = RecipeEntry>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|e| (e.ingredient_id, e.quantity))
                .collect(),
        )
    }

    pub fn quantity_of(&self, ingredient: IngredientId) -> Option<f64> {
        self.0.get(&ingredient).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Entries in ascending ingredient id.
    pub fn entries(&self) -> impl Iterator<Item = RecipeEntry> + '_ {
        self.0
            .iter()
            .map(|(id, qty)| RecipeEntry::new(*id, *qty))
    }
}

/// Menu: a sellable dish with a fixed unit price and a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    pub id: MenuId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub recipe: Recipe,
}

impl Entity for Menu {
    type Id = MenuId;

    fn id(&self) -> MenuId {
        self.id
    }
}

/// Payload for creating a menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMenu {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub recipe: Vec<RecipeEntry>,
}

impl NewMenu {
    /// Validate the payload and return its recipe.
    pub fn validate(&self) -> DomainResult<Recipe> {
        require_text("menu name", &self.name)?;
        require_text("menu description", &self.description)?;
        validate_price(self.price)?;
        Recipe::new(self.recipe.iter().copied())
    }
}

/// Partial update of a menu; `None` leaves the field unchanged.
///
/// A present `recipe` replaces the whole recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub recipe: Option<Vec<RecipeEntry>>,
}

impl MenuUpdate {
    /// Validate the update and return the replacement recipe, if any.
    pub fn validate(&self) -> DomainResult<Option<Recipe>> {
        if let Some(name) = &self.name {
            require_text("menu name", name)?;
        }
        if let Some(description) = &self.description {
            require_text("menu description", description)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        self.recipe
            .as_ref()
            .map(|entries| Recipe::new(entries.iter().copied()))
            .transpose()
    }
}

fn validate_price(price: Money) -> DomainResult<()> {
    if !price.is_positive() {
        return Err(DomainError::validation("menu price must be greater than zero"));
    }
    Ok(())
}
