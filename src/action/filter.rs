//! action::filter
//!
//! Stateless pass-through operator.
//!
//! Unlike the other operators nothing is derived or cached: the result is a
//! [`FilteredDataTree`] over the source, so every read applies the predicate
//! to the source's current entries.

use std::sync::Arc;

use crate::core::meta::Meta;
use crate::core::name::Name;
use crate::core::types::{DataType, Value};
use crate::tree::{FilteredDataTree, TreePredicate, TreeRef};

/// Keep the leaves whose name, attributes and type pass a predicate.
#[derive(Clone)]
pub struct FilterAction {
    predicate: TreePredicate,
}

impl FilterAction {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Name, &Meta, &DataType) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Keep leaves carrying the attribute at `key`.
    pub fn has_attribute(key: Name) -> Self {
        Self::new(move |_, meta, _| meta.get(&key).is_some())
    }

    /// Keep leaves whose type descriptor is compatible with `data_type`.
    pub fn of_type(data_type: DataType) -> Self {
        Self::new(move |_, _, actual| actual.is_compatible_with(&data_type))
    }

    pub fn execute<T: Value>(&self, source: TreeRef<T>) -> TreeRef<T> {
        Arc::new(FilteredDataTree::from_predicate(
            source,
            Arc::clone(&self.predicate),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Data;
    use crate::tree::{DataTree, MutableDataTree};

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn keeps_leaves_with_attribute() {
        let source = MutableDataTree::new(DataType::of::<i32>());
        source
            .put(&name("a"), Data::of(1, Meta::builder().set("unit", "m").unwrap().build()))
            .unwrap();
        source.put(&name("b"), Data::of(2, Meta::empty())).unwrap();

        let view = FilterAction::has_attribute(name("unit")).execute(source.share());
        assert!(view.read(&name("a")).is_some());
        assert!(view.read(&name("b")).is_none());
        assert!(view.is_observable());
    }

    #[test]
    fn attribute_removal_hides_leaf_on_next_read() {
        let source = MutableDataTree::new(DataType::of::<i32>());
        let tagged = Data::of(1, Meta::builder().set("unit", "m").unwrap().build());
        source.put(&name("a"), tagged.clone()).unwrap();
        let view = FilterAction::has_attribute(name("unit")).execute(source.share());
        assert_eq!(view.as_sequence().len(), 1);

        source.put(&name("a"), tagged.with_meta(Meta::empty())).unwrap();
        assert!(view.as_sequence().is_empty());
    }

    #[test]
    fn filters_by_type_tag() {
        let source: MutableDataTree<i32> = MutableDataTree::new(DataType::of::<i32>());
        let meters = Data::from_goal(
            crate::goal::Goal::of(3),
            DataType::tagged::<i32>("m"),
            Meta::empty(),
        );
        source.put(&name("len"), meters).unwrap();
        source.put(&name("count"), Data::of(4, Meta::empty())).unwrap();

        let view = FilterAction::of_type(DataType::tagged::<i32>("m")).execute(source.share());
        let names: Vec<String> = view
            .as_sequence()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["len"]);
    }
}
