//! tree
//!
//! Hierarchical containers of [`Data`].
//!
//! # Variants
//!
//! - [`StaticDataTree`] - frozen snapshot, cheap to clone and share
//! - [`MutableDataTree`] - builder with concurrency-safe writes and an
//!   update stream
//! - [`FilteredDataTree`] - stateless predicate view over another tree
//!
//! All of them are read through the object-safe [`DataTree`] trait and
//! passed around as [`TreeRef`].
//!
//! # Reserved names
//!
//! Tokens starting with `@` (see [`crate::core::name::META_TOKEN`]) hold node-level attributes.
//! They are stored like leaves but never show up in [`DataTree::items`] or
//! [`DataTree::as_sequence`].

mod node;

pub mod describe;
pub mod filter;
pub mod mutable;
pub mod snapshot;
pub mod updates;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::meta::Meta;
use crate::core::name::{Name, NameToken};
use crate::core::types::{DataType, Value};
use crate::data::{Data, NamedData};

pub use filter::{FilteredDataTree, TreePredicate};
pub use mutable::MutableDataTree;
pub use snapshot::{StaticDataTree, StaticTreeBuilder};
pub use updates::{Updates, UpdatesError};

/// Structural errors, raised synchronously by the offending write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("name conflict at '{name}': {reason}")]
    NameConflict { name: Name, reason: &'static str },

    #[error("type mismatch at '{name}': expected {expected}, found {actual}")]
    TypeMismatch {
        name: Name,
        expected: String,
        actual: String,
    },

    #[error("'{0}' is a reserved name")]
    ReservedName(Name),
}

/// Shared handle to any tree.
pub type TreeRef<T> = Arc<dyn DataTree<T>>;

/// A direct child: either a leaf or a sub-tree.
pub enum DataTreeItem<T: Value> {
    Leaf(Data<T>),
    Node(TreeRef<T>),
}

impl<T: Value> DataTreeItem<T> {
    pub fn as_leaf(&self) -> Option<&Data<T>> {
        match self {
            DataTreeItem::Leaf(data) => Some(data),
            DataTreeItem::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&TreeRef<T>> {
        match self {
            DataTreeItem::Leaf(_) => None,
            DataTreeItem::Node(tree) => Some(tree),
        }
    }
}

impl<T: Value> Clone for DataTreeItem<T> {
    fn clone(&self) -> Self {
        match self {
            DataTreeItem::Leaf(data) => DataTreeItem::Leaf(data.clone()),
            DataTreeItem::Node(tree) => DataTreeItem::Node(Arc::clone(tree)),
        }
    }
}

impl<T: Value> fmt::Debug for DataTreeItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataTreeItem::Leaf(data) => f.debug_tuple("Leaf").field(data).finish(),
            DataTreeItem::Node(tree) => f
                .debug_tuple("Node")
                .field(&tree.as_sequence().len())
                .finish(),
        }
    }
}

/// Read contract shared by every tree.
///
/// Only [`item`](DataTree::item), [`entries`](DataTree::entries),
/// [`data_type`](DataTree::data_type) and [`share`](DataTree::share) are
/// required; everything else walks those.
pub trait DataTree<T: Value>: Send + Sync + 'static {
    /// Descriptor every leaf is compatible with.
    fn data_type(&self) -> DataType;

    /// Direct child under `token`, reserved tokens included.
    fn item(&self, token: &NameToken) -> Option<DataTreeItem<T>>;

    /// All direct children in token order, reserved tokens included.
    fn entries(&self) -> Vec<(NameToken, DataTreeItem<T>)>;

    /// This tree as a shared handle.
    fn share(&self) -> TreeRef<T>;

    /// Subscribe to changed names. `None` for trees that never change.
    fn updates(&self) -> Option<Updates> {
        None
    }

    fn is_observable(&self) -> bool {
        self.updates().is_some()
    }

    /// Direct children, reserved tokens excluded.
    fn items(&self) -> BTreeMap<NameToken, DataTreeItem<T>> {
        self.entries()
            .into_iter()
            .filter(|(token, _)| !token.is_reserved())
            .collect()
    }

    /// Walk `name` one token per level.
    fn item_at(&self, name: &Name) -> Option<DataTreeItem<T>> {
        let (first, rest) = match name.first() {
            Some(first) => (first, name.cut_first()),
            None => return Some(DataTreeItem::Node(self.share())),
        };
        let item = self.item(first)?;
        if rest.is_empty() {
            return Some(item);
        }
        match item {
            DataTreeItem::Node(tree) => tree.item_at(&rest),
            DataTreeItem::Leaf(_) => None,
        }
    }

    /// The leaf at `name`, if there is one.
    fn read(&self, name: &Name) -> Option<Data<T>> {
        match self.item_at(name)? {
            DataTreeItem::Leaf(data) => Some(data),
            DataTreeItem::Node(_) => None,
        }
    }

    /// Sub-tree rooted at `name`. Missing or leaf names give an empty tree.
    fn branch(&self, name: &Name) -> TreeRef<T> {
        match self.item_at(name) {
            Some(DataTreeItem::Node(tree)) => tree,
            _ => Arc::new(StaticDataTree::empty(self.data_type())),
        }
    }

    /// Every leaf, depth-first in token order, with names relative to this tree.
    fn as_sequence(&self) -> Vec<NamedData<T>> {
        let mut out = Vec::new();
        collect_leaves(self, &Name::EMPTY, false, &mut out);
        out
    }

    /// Attributes attached to the node at `name`.
    fn node_meta(&self, name: &Name) -> Option<Meta> {
        let data = self.read(&meta_name(name))?;
        Some(data.meta().clone())
    }

    /// Freeze the current content.
    fn snapshot(&self) -> StaticDataTree<T> {
        let mut leaves = Vec::new();
        collect_leaves(self, &Name::EMPTY, true, &mut leaves);
        let mut builder = StaticDataTree::builder(self.data_type());
        for leaf in leaves {
            let (name, data) = leaf.into_parts();
            let stored = builder.put(&name, data).map(|_| ());
            debug_assert!(stored.is_ok(), "snapshot leaf conflicts: {:?}", stored);
        }
        builder.build()
    }
}

/// Depth-first leaf collection under `prefix`.
pub(crate) fn collect_leaves<T: Value>(
    tree: &(impl DataTree<T> + ?Sized),
    prefix: &Name,
    include_reserved: bool,
    out: &mut Vec<NamedData<T>>,
) {
    for (token, item) in tree.entries() {
        if !include_reserved && token.is_reserved() {
            continue;
        }
        let name = prefix.child(token);
        match item {
            DataTreeItem::Leaf(data) => out.push(data.named(name)),
            DataTreeItem::Node(sub) => collect_leaves(sub.as_ref(), &name, include_reserved, out),
        }
    }
}

/// Check `data` against a tree's declared type. Reserved entries are exempt.
pub(crate) fn check_type<T: Value>(
    expected: &DataType,
    name: &Name,
    data: &Data<T>,
) -> Result<(), TreeError> {
    if name.is_reserved() || data.data_type().is_compatible_with(expected) {
        return Ok(());
    }
    Err(TreeError::TypeMismatch {
        name: name.clone(),
        expected: expected.name(),
        actual: data.data_type().name(),
    })
}

/// Name of the attribute placeholder for the node at `name`.
pub(crate) fn meta_name(name: &Name) -> Name {
    name.child(NameToken::meta())
}

/// Build a predicate-filtered view of `tree`.
pub fn filtered<T, F>(tree: TreeRef<T>, predicate: F) -> FilteredDataTree<T>
where
    T: Value,
    F: Fn(&Name, &Meta, &DataType) -> bool + Send + Sync + 'static,
{
    FilteredDataTree::new(tree, predicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn sample() -> StaticDataTree<i32> {
        let mut builder = StaticDataTree::builder(DataType::of::<i32>());
        builder.put(&name("a"), Data::of(1, Meta::empty())).unwrap();
        builder.put(&name("g.b"), Data::of(2, Meta::empty())).unwrap();
        builder.put(&name("g.c[1]"), Data::of(3, Meta::empty())).unwrap();
        builder
            .set_node_meta(&name("g"), Meta::builder().set("title", "group").unwrap().build())
            .unwrap();
        builder.build()
    }

    #[test]
    fn read_walks_tokens() {
        let tree = sample();
        assert!(tree.read(&name("g.b")).is_some());
        assert!(tree.read(&name("g")).is_none());
        assert!(tree.read(&name("g.missing")).is_none());
        assert!(tree.read(&name("a.deeper")).is_none());
    }

    #[test]
    fn sequence_skips_reserved_entries() {
        let tree = sample();
        let names: Vec<String> = tree
            .as_sequence()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "g.b", "g.c[1]"]);
        assert_eq!(tree.branch(&name("g")).items().len(), 2);
    }

    #[test]
    fn branch_of_missing_name_is_empty() {
        let tree = sample();
        assert!(tree.branch(&name("nope")).as_sequence().is_empty());
        assert!(tree.branch(&name("a")).as_sequence().is_empty());
        assert_eq!(tree.branch(&Name::EMPTY).as_sequence().len(), 3);
    }

    #[test]
    fn node_meta_reads_placeholder() {
        let tree = sample();
        let meta = tree.node_meta(&name("g")).unwrap();
        assert_eq!(meta.get_str(&name("title")), Some("group"));
        assert!(tree.node_meta(&name("a")).is_none());
    }
}
