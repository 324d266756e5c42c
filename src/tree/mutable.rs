//! tree::mutable
//!
//! Concurrency-safe tree builder with an update stream.
//!
//! # Locking
//!
//! One `RwLock` guards the whole tree. The content behind it is a
//! copy-on-write [`NodeMap`], so [`MutableDataTree::snapshot`] is a pointer
//! copy and a write clones only the path it touches.
//!
//! # Events
//!
//! Every successful write sends exactly one event carrying the written name.
//! The event is sent while the write lock is still held, so subscribers see
//! events in write order and any read triggered by an event observes the
//! write.
//!
//! # Lifetime
//!
//! The update stream closes when the last clone of the tree is dropped.
//! Watchers started with [`MutableDataTree::write_and_watch`] hold a clone, so
//! they stop with the [`Scope`] they were spawned on.

use std::fmt;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::core::config::{Config, DEFAULT_UPDATE_CAPACITY};
use crate::core::meta::Meta;
use crate::core::name::{Name, NameToken};
use crate::core::sync::{read, write};
use crate::core::types::{DataType, Value};
use crate::data::Data;
use crate::goal::scope::Scope;

use super::node::{Entry, NodeMap};
use super::snapshot::StaticDataTree;
use super::updates::{Updates, UpdatesError};
use super::{check_type, collect_leaves, meta_name, DataTree, DataTreeItem, TreeError, TreeRef};

struct Shared<T: Value> {
    data_type: DataType,
    root: RwLock<Arc<NodeMap<T>>>,
    updates: broadcast::Sender<Name>,
}

/// Tree builder safe for concurrent writers.
///
/// Clones share the same content.
pub struct MutableDataTree<T: Value>(Arc<Shared<T>>);

impl<T: Value> MutableDataTree<T> {
    pub fn new(data_type: DataType) -> Self {
        Self::with_capacity(data_type, DEFAULT_UPDATE_CAPACITY)
    }

    /// A tree whose subscribers may fall `capacity` events behind before
    /// they lag.
    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self(Arc::new(Shared {
            data_type,
            root: RwLock::new(Arc::new(NodeMap::default())),
            updates,
        }))
    }

    pub fn from_config(data_type: DataType, config: &Config) -> Self {
        Self::with_capacity(data_type, config.update_capacity())
    }

    /// Store `data` at `name`, or remove whatever is there when `data` is `None`.
    ///
    /// Intermediate branches are created on demand and pruned when they
    /// become empty. Removing a name that holds nothing is a no-op and emits
    /// no event.
    ///
    /// # Errors
    ///
    /// - [`TreeError::NameConflict`] if a leaf sits on the path or a branch
    ///   sits at `name`
    /// - [`TreeError::TypeMismatch`] if `data` is incompatible with the tree
    pub fn write(&self, name: &Name, data: Option<Data<T>>) -> Result<(), TreeError> {
        if let Some(data) = &data {
            check_type(&self.0.data_type, name, data)?;
        }
        let mut root = write(&self.0.root);
        match data {
            Some(data) => {
                Arc::make_mut(&mut root).put(name, data)?;
                tracing::trace!(name = %name, kind = "put", "tree write");
            }
            None => {
                let removed = Arc::make_mut(&mut root).remove(name);
                tracing::trace!(name = %name, kind = "remove", removed, "tree write");
                if !removed {
                    return Ok(());
                }
            }
        }
        let _ = self.0.updates.send(name.clone());
        Ok(())
    }

    pub fn put(&self, name: &Name, data: Data<T>) -> Result<(), TreeError> {
        self.write(name, Some(data))
    }

    pub fn remove(&self, name: &Name) -> Result<(), TreeError> {
        self.write(name, None)
    }

    /// Attach attributes to the node at `name` without adding a leaf.
    pub fn set_node_meta(&self, name: &Name, meta: Meta) -> Result<(), TreeError> {
        self.write(&meta_name(name), Some(Data::empty(meta)))
    }

    /// Replace the content at `name` with a copy of `tree`, as one write.
    pub fn graft(&self, name: &Name, tree: &(impl DataTree<T> + ?Sized)) -> Result<(), TreeError> {
        let frozen = tree.snapshot();
        for leaf in frozen.as_sequence() {
            check_type(&self.0.data_type, &name.plus(leaf.name()), leaf.data())?;
        }
        let mut root = write(&self.0.root);
        Arc::make_mut(&mut root).put_node(name, Arc::clone(frozen.root()))?;
        tracing::trace!(name = %name, kind = "graft", "tree write");
        let _ = self.0.updates.send(name.clone());
        Ok(())
    }

    pub fn subscribe(&self) -> Updates {
        Updates::new(self.0.updates.subscribe())
    }

    /// Copy every entry of `source` under `prefix`.
    pub fn populate_from(
        &self,
        source: &(impl DataTree<T> + ?Sized),
        prefix: &Name,
    ) -> Result<(), TreeError> {
        let mut leaves = Vec::new();
        collect_leaves(source, &Name::EMPTY, true, &mut leaves);
        for leaf in leaves {
            let (name, data) = leaf.into_parts();
            self.write(&prefix.plus(&name), Some(data))?;
        }
        Ok(())
    }

    /// Copy `source` under `prefix`, then keep mirroring its changes.
    ///
    /// The subscription is taken before the copy, so no change falls between
    /// the two. Mirroring runs on `scope` until the scope is cancelled or the
    /// source closes its stream. A static source is only copied.
    pub fn write_and_watch(
        &self,
        scope: &Scope,
        source: TreeRef<T>,
        prefix: Name,
    ) -> Result<(), TreeError> {
        let updates = source.updates();
        self.populate_from(source.as_ref(), &prefix)?;
        let Some(mut updates) = updates else {
            return Ok(());
        };

        let target = self.clone();
        scope.spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(name) => target.mirror(source.as_ref(), &name, &prefix),
                    Err(UpdatesError::Lagged(_)) => target.resync(source.as_ref(), &prefix),
                    Err(UpdatesError::Closed) => break,
                }
            }
        });
        Ok(())
    }

    fn mirror(&self, source: &dyn DataTree<T>, name: &Name, prefix: &Name) {
        let target = prefix.plus(name);
        let result = match source.item_at(name) {
            Some(DataTreeItem::Leaf(data)) => self.write(&target, Some(data)),
            Some(DataTreeItem::Node(tree)) => self.graft(&target, tree.as_ref()),
            None => self.write(&target, None),
        };
        if let Err(err) = result {
            tracing::warn!(name = %target, error = %err, "failed to mirror update");
        }
    }

    fn resync(&self, source: &dyn DataTree<T>, prefix: &Name) {
        if let Err(err) = self.graft(prefix, source) {
            tracing::warn!(prefix = %prefix, error = %err, "failed to resync mirror");
        }
    }

    /// Live view of the entry at `path`.
    fn item_under(&self, path: &Name) -> Option<DataTreeItem<T>> {
        let root = read(&self.0.root);
        match root.get(path)? {
            Entry::Leaf(data) => Some(DataTreeItem::Leaf(data.clone())),
            Entry::Node(_) => Some(DataTreeItem::Node(Arc::new(MutableBranch {
                tree: self.clone(),
                prefix: path.clone(),
            }))),
        }
    }

    fn entries_under(&self, path: &Name) -> Vec<(NameToken, DataTreeItem<T>)> {
        let root = read(&self.0.root);
        let entries = if path.is_empty() {
            Some(root.entries())
        } else {
            root.get_node(path).map(|node| node.entries())
        };
        let Some(entries) = entries else {
            return Vec::new();
        };
        entries
            .iter()
            .map(|(token, entry)| {
                let item = match entry {
                    Entry::Leaf(data) => DataTreeItem::Leaf(data.clone()),
                    Entry::Node(_) => DataTreeItem::Node(Arc::new(MutableBranch {
                        tree: self.clone(),
                        prefix: path.child(token.clone()),
                    }) as TreeRef<T>),
                };
                (token.clone(), item)
            })
            .collect()
    }

    fn snapshot_under(&self, path: &Name) -> StaticDataTree<T> {
        let root = read(&self.0.root);
        let node = if path.is_empty() {
            Some(Arc::clone(&root))
        } else {
            root.get_node(path).cloned()
        };
        match node {
            Some(node) => StaticDataTree::from_root(self.0.data_type.clone(), node),
            None => StaticDataTree::empty(self.0.data_type.clone()),
        }
    }
}

impl<T: Value> DataTree<T> for MutableDataTree<T> {
    fn data_type(&self) -> DataType {
        self.0.data_type.clone()
    }

    fn item(&self, token: &NameToken) -> Option<DataTreeItem<T>> {
        self.item_under(&Name::from(token.clone()))
    }

    fn entries(&self) -> Vec<(NameToken, DataTreeItem<T>)> {
        self.entries_under(&Name::EMPTY)
    }

    fn share(&self) -> TreeRef<T> {
        Arc::new(self.clone())
    }

    fn updates(&self) -> Option<Updates> {
        Some(self.subscribe())
    }

    fn is_observable(&self) -> bool {
        true
    }

    fn item_at(&self, name: &Name) -> Option<DataTreeItem<T>> {
        if name.is_empty() {
            return Some(DataTreeItem::Node(self.share()));
        }
        self.item_under(name)
    }

    fn read(&self, name: &Name) -> Option<Data<T>> {
        read(&self.0.root).read(name).cloned()
    }

    fn snapshot(&self) -> StaticDataTree<T> {
        self.snapshot_under(&Name::EMPTY)
    }
}

impl<T: Value> Clone for MutableDataTree<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Value> fmt::Debug for MutableDataTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableDataTree")
            .field("type", &self.0.data_type)
            .field("subscribers", &self.0.updates.receiver_count())
            .finish()
    }
}

/// Live view of one branch of a [`MutableDataTree`].
///
/// Reads always reflect the current content; updates are limited to the
/// branch and relative to it.
struct MutableBranch<T: Value> {
    tree: MutableDataTree<T>,
    prefix: Name,
}

impl<T: Value> DataTree<T> for MutableBranch<T> {
    fn data_type(&self) -> DataType {
        self.tree.data_type()
    }

    fn item(&self, token: &NameToken) -> Option<DataTreeItem<T>> {
        self.tree.item_under(&self.prefix.child(token.clone()))
    }

    fn entries(&self) -> Vec<(NameToken, DataTreeItem<T>)> {
        self.tree.entries_under(&self.prefix)
    }

    fn share(&self) -> TreeRef<T> {
        Arc::new(MutableBranch {
            tree: self.tree.clone(),
            prefix: self.prefix.clone(),
        })
    }

    fn updates(&self) -> Option<Updates> {
        Some(self.tree.subscribe().under(&self.prefix))
    }

    fn is_observable(&self) -> bool {
        true
    }

    fn read(&self, name: &Name) -> Option<Data<T>> {
        self.tree.read(&self.prefix.plus(name))
    }

    fn snapshot(&self) -> StaticDataTree<T> {
        self.tree.snapshot_under(&self.prefix)
    }
}
