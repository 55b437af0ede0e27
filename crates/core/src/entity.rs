//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Every row-backed type exposes its identifier through this trait so that
/// stores can index and look up rows without knowing the concrete type.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Human-readable entity name (used in "not found" errors).
    const NAME: &'static str;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
