//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity: two `Money` amounts of 500 cents are the same
/// amount, and a recipe entry is fully described by its ingredient and quantity.
/// They are immutable; "changing" one means building a new value.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Portion {
///     ingredient: IngredientId,
///     quantity: f64,
/// }
///
/// impl ValueObject for Portion {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
