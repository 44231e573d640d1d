//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values, never by
/// identity. `RotationPolicy` or a lot draw `(lot_id, quantity)` pair are value
/// objects; a `Lot` (which has continuity across quantity changes) is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
