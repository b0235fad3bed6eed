//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values:
/// `Money(10.000) == Money(10.000)` regardless of where either came from.
/// Arithmetic on them returns new values instead of mutating in place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
