//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. In this
/// domain, validated client attributes (e-mail address, PESEL) are value
/// objects: once parsed they are known to be well-formed and never change.
///
/// ```ignore
/// let a = Email::parse("jan@example.com")?;
/// let b = Email::parse("jan@example.com")?;
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
