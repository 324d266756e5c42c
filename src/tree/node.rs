//! tree::node
//!
//! Copy-on-write node storage shared by snapshot and mutable trees.
//!
//! Child nodes sit behind `Arc`s. Mutation goes through `Arc::make_mut`, so
//! freezing a tree is a pointer copy and a later write only clones the path
//! it touches.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::name::{Name, NameToken};
use crate::core::types::Value;
use crate::data::Data;

use super::TreeError;

#[derive(Clone)]
pub(crate) enum Entry<T: Value> {
    Leaf(Data<T>),
    Node(Arc<NodeMap<T>>),
}

#[derive(Clone)]
pub(crate) struct NodeMap<T: Value> {
    entries: BTreeMap<NameToken, Entry<T>>,
}

impl<T: Value> Default for NodeMap<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Value> NodeMap<T> {
    pub(crate) fn entries(&self) -> &BTreeMap<NameToken, Entry<T>> {
        &self.entries
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, name: &Name) -> Option<&Entry<T>> {
        let (first, rest) = split_first(name)?;
        let entry = self.entries.get(first)?;
        if rest.is_empty() {
            return Some(entry);
        }
        match entry {
            Entry::Node(node) => node.get(&rest),
            Entry::Leaf(_) => None,
        }
    }

    pub(crate) fn get_node(&self, name: &Name) -> Option<&Arc<NodeMap<T>>> {
        match self.get(name)? {
            Entry::Node(node) => Some(node),
            Entry::Leaf(_) => None,
        }
    }

    pub(crate) fn read(&self, name: &Name) -> Option<&Data<T>> {
        match self.get(name)? {
            Entry::Leaf(data) => Some(data),
            Entry::Node(_) => None,
        }
    }

    /// Store a leaf, creating intermediate branches.
    pub(crate) fn put(&mut self, name: &Name, data: Data<T>) -> Result<(), TreeError> {
        self.put_at(name, 0, data)
    }

    fn put_at(&mut self, full: &Name, depth: usize, data: Data<T>) -> Result<(), TreeError> {
        let tokens = full.tokens();
        let Some(token) = tokens.get(depth) else {
            return Err(TreeError::NameConflict {
                name: full.clone(),
                reason: "the tree root cannot hold a value",
            });
        };

        if depth + 1 == tokens.len() {
            if matches!(self.entries.get(token), Some(Entry::Node(_))) {
                return Err(TreeError::NameConflict {
                    name: full.clone(),
                    reason: "a branch already occupies this name",
                });
            }
            self.entries.insert(token.clone(), Entry::Leaf(data));
            return Ok(());
        }

        match self.entries.entry(token.clone()) {
            MapEntry::Vacant(vacant) => {
                let mut node = NodeMap::default();
                node.put_at(full, depth + 1, data)?;
                vacant.insert(Entry::Node(Arc::new(node)));
                Ok(())
            }
            MapEntry::Occupied(mut occupied) => match occupied.get_mut() {
                Entry::Leaf(_) => Err(TreeError::NameConflict {
                    name: full.clone(),
                    reason: "a leaf occupies a parent of this name",
                }),
                Entry::Node(node) => Arc::make_mut(node).put_at(full, depth + 1, data),
            },
        }
    }

    /// Graft a whole node, replacing whatever was at `name`.
    pub(crate) fn put_node(&mut self, name: &Name, node: Arc<NodeMap<T>>) -> Result<(), TreeError> {
        let Some(last) = name.last() else {
            *self = (*node).clone();
            return Ok(());
        };
        let parent = self.node_mut(&name.cut_last(), name)?;
        if node.is_empty() {
            parent.entries.remove(last);
        } else {
            parent.entries.insert(last.clone(), Entry::Node(node));
        }
        Ok(())
    }

    fn node_mut(&mut self, path: &Name, full: &Name) -> Result<&mut NodeMap<T>, TreeError> {
        let mut current = self;
        for token in path.tokens() {
            let entry = current
                .entries
                .entry(token.clone())
                .or_insert_with(|| Entry::Node(Arc::new(NodeMap::default())));
            current = match entry {
                Entry::Node(node) => Arc::make_mut(node),
                Entry::Leaf(_) => {
                    return Err(TreeError::NameConflict {
                        name: full.clone(),
                        reason: "a leaf occupies a parent of this name",
                    })
                }
            };
        }
        Ok(current)
    }

    /// Remove the leaf or branch at `name`, pruning emptied branches.
    ///
    /// Returns true if something was removed.
    pub(crate) fn remove(&mut self, name: &Name) -> bool {
        let Some((first, rest)) = split_first(name) else {
            let removed = !self.entries.is_empty();
            self.entries.clear();
            return removed;
        };
        if rest.is_empty() {
            return self.entries.remove(first).is_some();
        }
        let Some(Entry::Node(node)) = self.entries.get_mut(first) else {
            return false;
        };
        if node.get(&rest).is_none() {
            return false;
        }
        let node = Arc::make_mut(node);
        let removed = node.remove(&rest);
        if node.is_empty() {
            self.entries.remove(first);
        }
        removed
    }
}

fn split_first(name: &Name) -> Option<(&NameToken, Name)> {
    name.first().map(|first| (first, name.cut_first()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::meta::Meta;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn leaf(v: i32) -> Data<i32> {
        Data::of(v, Meta::empty())
    }

    #[test]
    fn put_creates_branches() {
        let mut root = NodeMap::default();
        root.put(&name("a.b.c"), leaf(1)).unwrap();
        assert!(root.read(&name("a.b.c")).is_some());
        assert!(root.get_node(&name("a.b")).is_some());
        assert!(root.read(&name("a.b")).is_none());
    }

    #[test]
    fn conflicts_are_reported() {
        let mut root = NodeMap::default();
        root.put(&name("a.b"), leaf(1)).unwrap();
        assert!(matches!(
            root.put(&name("a"), leaf(2)),
            Err(TreeError::NameConflict { .. })
        ));
        assert!(matches!(
            root.put(&name("a.b.c"), leaf(2)),
            Err(TreeError::NameConflict { .. })
        ));
        assert!(matches!(
            root.put(&Name::EMPTY, leaf(2)),
            Err(TreeError::NameConflict { .. })
        ));
        // Replacing a leaf with a leaf is fine.
        root.put(&name("a.b"), leaf(3)).unwrap();
    }

    #[test]
    fn remove_prunes_empty_branches() {
        let mut root = NodeMap::default();
        root.put(&name("x.y.z"), leaf(1)).unwrap();
        root.put(&name("w"), leaf(2)).unwrap();
        assert!(root.remove(&name("x.y.z")));
        assert!(root.get(&name("x")).is_none());
        assert!(!root.remove(&name("x.y.z")));
        assert!(root.read(&name("w")).is_some());
    }

    #[test]
    fn remove_whole_branch() {
        let mut root = NodeMap::default();
        root.put(&name("g.a"), leaf(1)).unwrap();
        root.put(&name("g.b"), leaf(2)).unwrap();
        assert!(root.remove(&name("g")));
        assert!(root.is_empty());
    }

    #[test]
    fn copy_on_write_keeps_snapshots() {
        let mut root = Arc::new(NodeMap::default());
        Arc::make_mut(&mut root).put(&name("a.b"), leaf(1)).unwrap();
        let frozen = Arc::clone(&root);
        Arc::make_mut(&mut root).put(&name("a.c"), leaf(2)).unwrap();
        assert!(frozen.read(&name("a.c")).is_none());
        assert!(root.read(&name("a.c")).is_some());
    }

    #[test]
    fn put_node_grafts_and_clears() {
        let mut source = NodeMap::default();
        source.put(&name("p"), leaf(1)).unwrap();
        let mut root = NodeMap::default();
        root.put_node(&name("x.y"), Arc::new(source)).unwrap();
        assert!(root.read(&name("x.y.p")).is_some());
        root.put_node(&name("x.y"), Arc::new(NodeMap::default())).unwrap();
        assert!(root.get(&name("x.y")).is_none());
    }
}
