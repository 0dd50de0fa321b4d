//! Record capability: how payload types expose their identifier and
//! parent-identifier fields.
//!
//! The declarative field markers of the source model become a trait impl:
//! implementing [`Record`] *is* the tree-marker, and the two accessors are
//! the id/parent field markers. Both identifiers share the single associated
//! `Key` type, so mismatched identifier types cannot be expressed.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::Hash;

/// Bounds every element identifier type must satisfy.
///
/// Blanket-implemented; callers never implement this directly.
pub trait Key: Clone + Eq + Hash + Ord + fmt::Debug + 'static {}

impl<T> Key for T where T: Clone + Eq + Hash + Ord + fmt::Debug + 'static {}

/// A flat record that can participate in a tree.
///
/// `identifier` may legitimately return `None` for malformed input; the
/// transformation pipeline rejects such records during pre-validation.
/// A `None` parent marks a first-level record (child of the session root).
pub trait Record: Clone + PartialEq + fmt::Debug + 'static {
    type Key: Key;

    fn identifier(&self) -> Option<Self::Key>;

    fn parent_identifier(&self) -> Option<Self::Key>;
}

/// Object-safe view of a record, so sessions holding different record types
/// can live in one registry as long as they agree on the key type.
pub trait ErasedRecord<K: Key>: fmt::Debug {
    fn identifier(&self) -> Option<K>;

    fn parent_identifier(&self) -> Option<K>;

    /// Runtime type of the underlying record, compared against the owning
    /// session's declared type on persist/update.
    fn record_type(&self) -> TypeId;

    /// Human-readable type name for error messages.
    fn record_type_name(&self) -> &'static str;

    fn clone_boxed(&self) -> BoxedRecord<K>;

    /// Structural equality across the erasure boundary; false when the
    /// concrete types differ.
    fn eq_record(&self, other: &dyn ErasedRecord<K>) -> bool;

    fn as_any(&self) -> &dyn Any;
}

pub type BoxedRecord<K> = Box<dyn ErasedRecord<K>>;

impl<R> ErasedRecord<R::Key> for R
where
    R: Record,
{
    fn identifier(&self) -> Option<R::Key> {
        Record::identifier(self)
    }

    fn parent_identifier(&self) -> Option<R::Key> {
        Record::parent_identifier(self)
    }

    fn record_type(&self) -> TypeId {
        TypeId::of::<R>()
    }

    fn record_type_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn clone_boxed(&self) -> BoxedRecord<R::Key> {
        Box::new(self.clone())
    }

    fn eq_record(&self, other: &dyn ErasedRecord<R::Key>) -> bool {
        other
            .as_any()
            .downcast_ref::<R>()
            .map(|o| self == o)
            .unwrap_or(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<K: Key> Clone for BoxedRecord<K> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}
