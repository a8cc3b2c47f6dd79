//! Stored records with a database-assigned identity.

use std::collections::BTreeMap;

/// A record whose id stays fixed while every other field may be edited.
pub trait Entity {
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;
}

/// Key records by id. A later record replaces an earlier one with the same id.
pub fn index_by_id<E: Entity>(records: impl IntoIterator<Item = E>) -> BTreeMap<E::Id, E> {
    records.into_iter().map(|r| (r.id(), r)).collect()
}
