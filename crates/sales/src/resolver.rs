//! Bill-of-materials resolver.
//!
//! Expands requested menus into the ingredient quantities they consume. The
//! result depends only on the multiset of requests and the catalog, never on
//! the order in which lines were submitted: duplicate menus are merged first,
//! menus are folded in ascending id, and requirements accumulate in an ordered
//! map keyed by ingredient id.

use std::collections::BTreeMap;

use comanda_core::MenuId;
use comanda_inventory::Requirements;
use comanda_menu::{Menu, Recipe};

use crate::placement::PlacementError;

/// Read access to menu recipes.
pub trait RecipeBook {
    fn recipe(&self, menu: MenuId) -> Option<&Recipe>;
}

impl RecipeBook for BTreeMap<MenuId, Menu> {
    fn recipe(&self, menu: MenuId) -> Option<&Recipe> {
        self.get(&menu).map(|m| &m.recipe)
    }
}

impl RecipeBook for BTreeMap<MenuId, Recipe> {
    fn recipe(&self, menu: MenuId) -> Option<&Recipe> {
        self.get(&menu)
    }
}

/// Expand `(menu, quantity)` requests into ingredient requirements.
///
/// Fails with [`PlacementError::UnknownMenu`] for the lowest unknown menu id.
/// Quantities are taken as given; callers validate them beforehand.
pub fn resolve<B>(
    requests: impl IntoIterator<Item = (MenuId, i64)>,
    book: &B,
) -> Result<Requirements, PlacementError>
where
    B: RecipeBook + ?Sized,
{
    let mut merged: BTreeMap<MenuId, i64> = BTreeMap::new();
    for (menu_id, quantity) in requests {
        let slot = merged.entry(menu_id).or_insert(0);
        *slot = slot.saturating_add(quantity);
    }

    let mut requirements = Requirements::new();
    for (menu_id, quantity) in merged {
        let recipe = book
            .recipe(menu_id)
            .ok_or(PlacementError::UnknownMenu(menu_id))?;
        for entry in recipe.entries() {
            requirements.add(entry.ingredient_id, entry.quantity * quantity as f64);
        }
    }

    Ok(requirements)
}
