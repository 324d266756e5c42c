//! tree::snapshot
//!
//! Frozen trees.
//!
//! A [`StaticDataTree`] never changes after [`StaticTreeBuilder::build`], so
//! it has no update stream. Cloning shares the node storage.

use std::fmt;
use std::sync::Arc;

use crate::core::meta::Meta;
use crate::core::name::{Name, NameToken};
use crate::core::types::{DataType, Value};
use crate::data::{Data, NamedData};

use super::node::{Entry, NodeMap};
use super::{check_type, meta_name, DataTree, DataTreeItem, TreeError, TreeRef};

/// Immutable tree snapshot.
pub struct StaticDataTree<T: Value> {
    data_type: DataType,
    root: Arc<NodeMap<T>>,
}

impl<T: Value> StaticDataTree<T> {
    /// A tree with no entries.
    pub fn empty(data_type: DataType) -> Self {
        Self::from_root(data_type, Arc::new(NodeMap::default()))
    }

    pub fn builder(data_type: DataType) -> StaticTreeBuilder<T> {
        StaticTreeBuilder {
            data_type,
            root: NodeMap::default(),
        }
    }

    pub(crate) fn from_root(data_type: DataType, root: Arc<NodeMap<T>>) -> Self {
        Self { data_type, root }
    }

    pub(crate) fn root(&self) -> &Arc<NodeMap<T>> {
        &self.root
    }

    /// Build a tree from named data.
    ///
    /// # Errors
    ///
    /// Fails on the first structural conflict or incompatible type.
    pub fn from_sequence(
        data_type: DataType,
        items: impl IntoIterator<Item = NamedData<T>>,
    ) -> Result<Self, TreeError> {
        let mut builder = Self::builder(data_type);
        for item in items {
            let (name, data) = item.into_parts();
            builder.put(&name, data)?;
        }
        Ok(builder.build())
    }

    /// Number of public leaves.
    pub fn len(&self) -> usize {
        self.as_sequence().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.entries().keys().all(NameToken::is_reserved)
    }

    fn to_item(&self, entry: &Entry<T>) -> DataTreeItem<T> {
        match entry {
            Entry::Leaf(data) => DataTreeItem::Leaf(data.clone()),
            Entry::Node(node) => DataTreeItem::Node(Arc::new(Self::from_root(
                self.data_type.clone(),
                Arc::clone(node),
            ))),
        }
    }
}

impl<T: Value> DataTree<T> for StaticDataTree<T> {
    fn data_type(&self) -> DataType {
        self.data_type.clone()
    }

    fn item(&self, token: &NameToken) -> Option<DataTreeItem<T>> {
        self.root.entries().get(token).map(|entry| self.to_item(entry))
    }

    fn entries(&self) -> Vec<(NameToken, DataTreeItem<T>)> {
        self.root
            .entries()
            .iter()
            .map(|(token, entry)| (token.clone(), self.to_item(entry)))
            .collect()
    }

    fn share(&self) -> TreeRef<T> {
        Arc::new(self.clone())
    }

    fn read(&self, name: &Name) -> Option<Data<T>> {
        self.root.read(name).cloned()
    }

    fn branch(&self, name: &Name) -> TreeRef<T> {
        match self.root.get_node(name) {
            Some(node) => Arc::new(Self::from_root(self.data_type.clone(), Arc::clone(node))),
            None if name.is_empty() => self.share(),
            None => Arc::new(Self::empty(self.data_type.clone())),
        }
    }

    fn snapshot(&self) -> StaticDataTree<T> {
        self.clone()
    }
}

impl<T: Value> Clone for StaticDataTree<T> {
    fn clone(&self) -> Self {
        Self {
            data_type: self.data_type.clone(),
            root: Arc::clone(&self.root),
        }
    }
}

impl<T: Value> fmt::Debug for StaticDataTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticDataTree")
            .field("type", &self.data_type)
            .field("leaves", &self.len())
            .finish()
    }
}

/// Accumulates entries for a [`StaticDataTree`].
pub struct StaticTreeBuilder<T: Value> {
    data_type: DataType,
    root: NodeMap<T>,
}

impl<T: Value> StaticTreeBuilder<T> {
    /// Store `data` at `name`, replacing any leaf already there.
    pub fn put(&mut self, name: &Name, data: Data<T>) -> Result<&mut Self, TreeError> {
        check_type(&self.data_type, name, &data)?;
        self.root.put(name, data)?;
        Ok(self)
    }

    /// Attach attributes to the node at `name`.
    pub fn set_node_meta(&mut self, name: &Name, meta: Meta) -> Result<&mut Self, TreeError> {
        self.root.put(&meta_name(name), Data::empty(meta))?;
        Ok(self)
    }

    pub fn build(self) -> StaticDataTree<T> {
        StaticDataTree::from_root(self.data_type, Arc::new(self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn builder_rejects_incompatible_types() {
        let mut builder: StaticTreeBuilder<i32> =
            StaticDataTree::builder(DataType::tagged::<i32>("meters"));
        let plain = Data::of(1, Meta::empty());
        assert!(matches!(
            builder.put(&name("x"), plain),
            Err(TreeError::TypeMismatch { .. })
        ));
        let tagged = Data::from_goal(
            crate::goal::Goal::of(1),
            DataType::tagged::<i32>("meters"),
            Meta::empty(),
        );
        builder.put(&name("x"), tagged).unwrap();
        assert_eq!(builder.build().len(), 1);
    }

    #[test]
    fn clone_shares_storage() {
        let tree = StaticDataTree::from_sequence(
            DataType::of::<i32>(),
            vec![Data::of(1, Meta::empty()).named(name("a.b"))],
        )
        .unwrap();
        let copy = tree.clone();
        assert!(Arc::ptr_eq(&tree.root, &copy.root));
        assert_eq!(
            copy.read(&name("a.b")).unwrap().goal().id(),
            tree.read(&name("a.b")).unwrap().goal().id()
        );
    }

    #[test]
    fn empty_tree_is_empty() {
        let tree: StaticDataTree<i32> = StaticDataTree::empty(DataType::of::<i32>());
        assert!(tree.is_empty());
        assert!(!tree.is_observable());
        assert!(tree.items().is_empty());
    }

    #[test]
    fn meta_only_tree_counts_as_empty() {
        let mut builder: StaticTreeBuilder<i32> = StaticDataTree::builder(DataType::of::<i32>());
        builder.set_node_meta(&Name::EMPTY, Meta::of("root")).unwrap();
        let tree = builder.build();
        assert!(tree.is_empty());
        assert_eq!(
            tree.node_meta(&Name::EMPTY).unwrap().value(),
            Some(&serde_json::json!("root"))
        );
    }
}
