//! tree::filter
//!
//! Stateless predicate view over another tree.
//!
//! The predicate sees each leaf's name (relative to the filtered root), its
//! attributes and its type descriptor, and is evaluated on every read. There
//! is no cache: a leaf whose attributes changed is judged on the new ones the
//! next time it is read. Branches with no visible leaf are hidden. Reserved
//! entries pass through untouched.
//!
//! Update events are forwarded unchanged, including events for leaves the
//! predicate rejects; a consumer re-reading such a name finds nothing, which
//! is how it learns that a leaf left the view.

use std::fmt;
use std::sync::Arc;

use crate::core::meta::Meta;
use crate::core::name::{Name, NameToken};
use crate::core::types::{DataType, Value};

use super::updates::Updates;
use super::{DataTree, DataTreeItem, TreeRef};

/// Leaf predicate over name, attributes and type.
pub type TreePredicate = Arc<dyn Fn(&Name, &Meta, &DataType) -> bool + Send + Sync>;

/// View of `source` containing only leaves accepted by a predicate.
pub struct FilteredDataTree<T: Value> {
    source: TreeRef<T>,
    prefix: Name,
    predicate: TreePredicate,
}

impl<T: Value> FilteredDataTree<T> {
    pub fn new<F>(source: TreeRef<T>, predicate: F) -> Self
    where
        F: Fn(&Name, &Meta, &DataType) -> bool + Send + Sync + 'static,
    {
        Self::from_predicate(source, Arc::new(predicate))
    }

    pub fn from_predicate(source: TreeRef<T>, predicate: TreePredicate) -> Self {
        Self {
            source,
            prefix: Name::EMPTY,
            predicate,
        }
    }

    fn child(&self, token: &NameToken, source: TreeRef<T>) -> Self {
        Self {
            source,
            prefix: self.prefix.child(token.clone()),
            predicate: Arc::clone(&self.predicate),
        }
    }

    fn view(&self, token: &NameToken, item: DataTreeItem<T>) -> Option<DataTreeItem<T>> {
        if token.is_reserved() {
            return Some(item);
        }
        match item {
            DataTreeItem::Leaf(data) => {
                let name = self.prefix.child(token.clone());
                (self.predicate)(&name, data.meta(), data.data_type()).then_some(DataTreeItem::Leaf(data))
            }
            DataTreeItem::Node(tree) => {
                let child = self.child(token, tree);
                child
                    .has_visible_leaf()
                    .then(|| DataTreeItem::Node(Arc::new(child) as TreeRef<T>))
            }
        }
    }

    fn has_visible_leaf(&self) -> bool {
        self.source
            .entries()
            .into_iter()
            .filter(|(token, _)| !token.is_reserved())
            .any(|(token, item)| self.view(&token, item).is_some())
    }
}

impl<T: Value> DataTree<T> for FilteredDataTree<T> {
    fn data_type(&self) -> DataType {
        self.source.data_type()
    }

    fn item(&self, token: &NameToken) -> Option<DataTreeItem<T>> {
        let item = self.source.item(token)?;
        self.view(token, item)
    }

    fn entries(&self) -> Vec<(NameToken, DataTreeItem<T>)> {
        self.source
            .entries()
            .into_iter()
            .filter_map(|(token, item)| self.view(&token, item).map(|item| (token, item)))
            .collect()
    }

    fn share(&self) -> TreeRef<T> {
        Arc::new(Self {
            source: Arc::clone(&self.source),
            prefix: self.prefix.clone(),
            predicate: Arc::clone(&self.predicate),
        })
    }

    /// Every source event, unfiltered.
    ///
    /// Subscribers receive a superset of the names whose visible content
    /// changed, at least once each, including names the predicate hides.
    /// Re-read the name to learn whether it is visible.
    fn updates(&self) -> Option<Updates> {
        self.source.updates()
    }

    fn is_observable(&self) -> bool {
        self.source.is_observable()
    }
}

impl<T: Value> fmt::Debug for FilteredDataTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredDataTree")
            .field("prefix", &self.prefix.to_string())
            .finish()
    }
}
