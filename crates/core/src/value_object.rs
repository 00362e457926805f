//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attribute values.
/// `Amount { 100.00 }` is a value object; a `Customer` with an id is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
