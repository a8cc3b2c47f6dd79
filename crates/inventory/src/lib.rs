//! Inventory domain module.
//!
//! This crate contains business rules for kitchen ingredients and their on-hand
//! stock, implemented purely as deterministic domain logic (no IO, no storage).
//! The storage layer runs [`plan_deduction`] inside its transaction and applies
//! the resulting deductions verbatim.

pub mod ingredient;
pub mod ledger;

pub use ingredient::{Ingredient, IngredientUpdate, NewIngredient};
pub use ledger::{
    Deduction, MISSING_INGREDIENT, Requirements, Shortage, StockLevel, level_name, plan_deduction,
};
