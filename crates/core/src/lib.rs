//! Shared primitives for the comanda crates.
//!
//! Typed ids, integer-cent [`Money`] and [`DomainError`]. Nothing here talks
//! to storage.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::{Entity, index_by_id};
pub use error::{DomainError, DomainResult};
pub use id::{ClientId, IngredientId, MenuId, OrderId};
pub use money::Money;
pub use value_object::ValueObject;
