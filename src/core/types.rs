//! core::types
//!
//! Result-type descriptors for tree-wide compatibility checks.
//!
//! # Types
//!
//! - [`Value`] - Bound satisfied by every computed value
//! - [`DataType`] - Descriptor carried by every `Data`
//! - [`AnyValue`] - Type-erased value for heterogeneous trees
//!
//! A descriptor names a concrete Rust type plus an optional refinement tag.
//! A descriptor is compatible with an expected descriptor when the Rust types
//! match and either the expectation carries no tag or the tags are equal.
//! Type-erased descriptors additionally remember the type that was erased.
//!
//! # Example
//!
//! ```
//! use goaltree::core::types::DataType;
//!
//! let any_number = DataType::of::<i64>();
//! let celsius = DataType::tagged::<i64>("celsius");
//!
//! assert!(celsius.is_compatible_with(&any_number));
//! assert!(!any_number.is_compatible_with(&celsius));
//! assert!(!DataType::of::<String>().is_compatible_with(&any_number));
//! ```

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Bound for values flowing through goals and trees.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

/// A value whose concrete type has been erased.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Describes the result type of a computation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DataType {
    id: TypeId,
    name: &'static str,
    tag: Option<Cow<'static, str>>,
    erased: Option<(TypeId, &'static str)>,
}

impl DataType {
    /// Descriptor for the Rust type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            tag: None,
            erased: None,
        }
    }

    /// Descriptor for `T` refined by a domain tag.
    pub fn tagged<T: 'static>(tag: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::of::<T>()
        }
    }

    /// Descriptor for a value of this type after erasure into [`AnyValue`].
    pub fn erased(&self) -> Self {
        if self.erased.is_some() {
            return self.clone();
        }
        Self {
            id: TypeId::of::<AnyValue>(),
            name: std::any::type_name::<AnyValue>(),
            tag: self.tag.clone(),
            erased: Some((self.id, self.name)),
        }
    }

    /// The concrete type hidden behind an erased descriptor.
    pub fn erased_type_id(&self) -> Option<TypeId> {
        self.erased.map(|(id, _)| id)
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name, including the tag if any.
    pub fn name(&self) -> String {
        let base = self.erased.map(|(_, n)| n).unwrap_or(self.name);
        match &self.tag {
            Some(tag) => format!("{}#{}", base, tag),
            None => base.to_string(),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns true if data of this type may be stored where `expected` is required.
    pub fn is_compatible_with(&self, expected: &DataType) -> bool {
        if self.id != expected.id {
            return false;
        }
        if let Some(inner) = expected.erased_type_id() {
            if self.erased_type_id() != Some(inner) {
                return false;
            }
        }
        match &expected.tag {
            None => true,
            Some(tag) => self.tag.as_ref() == Some(tag),
        }
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({})", self.name())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_is_compatible() {
        assert!(DataType::of::<u8>().is_compatible_with(&DataType::of::<u8>()));
        assert!(!DataType::of::<u8>().is_compatible_with(&DataType::of::<u16>()));
    }

    #[test]
    fn tags_refine() {
        let plain = DataType::of::<f64>();
        let tagged = DataType::tagged::<f64>("meters");
        assert!(tagged.is_compatible_with(&plain));
        assert!(!plain.is_compatible_with(&tagged));
        assert!(!DataType::tagged::<f64>("feet").is_compatible_with(&tagged));
    }

    #[test]
    fn erased_remembers_inner_type() {
        let erased = DataType::of::<String>().erased();
        assert_eq!(erased.type_id(), TypeId::of::<AnyValue>());
        assert_eq!(erased.erased_type_id(), Some(TypeId::of::<String>()));
        assert!(erased.name().contains("String"));
        assert_eq!(erased.erased(), erased);
    }

    #[test]
    fn erased_compatibility() {
        let any = DataType::of::<AnyValue>();
        let erased_string = DataType::of::<String>().erased();
        let erased_int = DataType::of::<i32>().erased();
        assert!(erased_string.is_compatible_with(&any));
        assert!(!erased_int.is_compatible_with(&erased_string));
        assert!(erased_string.is_compatible_with(&DataType::of::<String>().erased()));
    }
}
