//! Entity trait: identity + continuity inside an aggregate.

/// Entity marker + minimal interface.
///
/// Entities live inside an aggregate (an order's lines) and are never
/// persisted or mutated on their own.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
