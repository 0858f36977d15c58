//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Clients and trips are entities; a registration is identified by the
/// (client, trip) pair it links.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
