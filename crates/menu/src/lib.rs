//! Menu domain module.
//!
//! Menus are the sellable dishes of the restaurant. Each carries a recipe: the
//! quantity of every ingredient consumed by one unit of the menu. Pure domain
//! logic only (no IO, no storage).

pub mod menu;

pub use menu::{Menu, MenuUpdate, NewMenu, Recipe, RecipeEntry};
