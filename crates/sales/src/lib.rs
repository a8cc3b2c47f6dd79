//! Sales domain module: orders and the placement rules around them.
//!
//! Everything here is deterministic domain logic (no IO, no storage):
//!
//! - [`resolver`] expands requested menus into ingredient requirements;
//! - [`placement`] validates requests, prices them from the catalog and defines
//!   the placement error taxonomy and state machine;
//! - [`order`] is the committed order record;
//! - [`receipt`] renders a committed order for the customer.
//!
//! The storage layer drives these pieces inside one transaction.

pub mod order;
pub mod placement;
pub mod receipt;
pub mod resolver;

pub use order::{Order, OrderLine};
pub use placement::{
    LineRequest, OrderQuantities, PlacementError, PlacementPhase, PlacementRequest, describe_lines,
    price_lines, validate_request,
};
pub use receipt::{Receipt, ReceiptError, ReceiptHeader, ReceiptLine};
pub use resolver::{RecipeBook, resolve};
