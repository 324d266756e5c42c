//! core::meta
//!
//! Immutable attribute trees attached to every piece of data.
//!
//! # Model
//!
//! A [`Meta`] node optionally holds a JSON value and a map of named children.
//! Lookups walk one [`NameToken`] per level. Values are shared behind an
//! `Arc`, so cloning a `Meta` is cheap.
//!
//! # Layering
//!
//! [`Laminate`] resolves a path against several layers in declaration order:
//! the first layer that defines a value wins, and child nodes are merged
//! recursively. [`Meta::laminate`] materializes the merged tree.
//!
//! # Example
//!
//! ```
//! use goaltree::core::meta::{Laminate, Meta};
//! use goaltree::core::name::Name;
//!
//! let item = Meta::builder().set("color", "red").unwrap().build();
//! let defaults = Meta::builder()
//!     .set("color", "blue").unwrap()
//!     .set("size", 3).unwrap()
//!     .build();
//!
//! let layered = Laminate::new([item, defaults]);
//! let color = Name::parse("color").unwrap();
//! assert_eq!(layered.get_str(&color), Some("red"));
//! assert_eq!(layered.to_meta().get_value(&Name::parse("size").unwrap()), Some(&3.into()));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::name::{Name, NameError, NameToken};

/// Key under which a node's own value is written when it also has children.
const VALUE_KEY: &str = "@value";

#[derive(Debug, Default, PartialEq)]
struct MetaNode {
    value: Option<Value>,
    items: BTreeMap<NameToken, Meta>,
}

/// An immutable hierarchical attribute map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta(Arc<MetaNode>);

impl Meta {
    /// An attribute tree with no value and no children.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A leaf node holding a single value.
    pub fn of(value: impl Into<Value>) -> Self {
        Self(Arc::new(MetaNode {
            value: Some(value.into()),
            items: BTreeMap::new(),
        }))
    }

    pub fn builder() -> MetaBuilder {
        MetaBuilder::default()
    }

    /// Start a builder pre-populated with this tree.
    pub fn to_builder(&self) -> MetaBuilder {
        MetaBuilder {
            value: self.0.value.clone(),
            items: self
                .0
                .items
                .iter()
                .map(|(k, v)| (k.clone(), v.to_builder()))
                .collect(),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.0.value.as_ref()
    }

    pub fn items(&self) -> &BTreeMap<NameToken, Meta> {
        &self.0.items
    }

    pub fn is_empty(&self) -> bool {
        self.0.value.is_none() && self.0.items.is_empty()
    }

    /// Walk to the node at `name`.
    pub fn get(&self, name: &Name) -> Option<&Meta> {
        let mut current = self;
        for token in name.tokens() {
            current = current.0.items.get(token)?;
        }
        Some(current)
    }

    pub fn get_value(&self, name: &Name) -> Option<&Value> {
        self.get(name).and_then(Meta::value)
    }

    pub fn get_str(&self, name: &Name) -> Option<&str> {
        self.get_value(name).and_then(Value::as_str)
    }

    /// Merge layers, first-defined value wins at every node.
    pub fn laminate<'a>(layers: impl IntoIterator<Item = &'a Meta>) -> Meta {
        let layers: Vec<&Meta> = layers.into_iter().filter(|m| !m.is_empty()).collect();
        match layers.as_slice() {
            [] => Meta::empty(),
            [single] => (*single).clone(),
            _ => merge(&layers),
        }
    }

    /// Render as JSON.
    ///
    /// Leaves become their value, nodes become objects. A node with both a
    /// value and children stores the value under `@value`.
    pub fn to_json(&self) -> Value {
        if self.0.items.is_empty() {
            return self.0.value.clone().unwrap_or(Value::Null);
        }
        let mut object = Map::new();
        if let Some(value) = &self.0.value {
            object.insert(VALUE_KEY.to_string(), value.clone());
        }
        for (token, child) in &self.0.items {
            object.insert(token.to_string(), child.to_json());
        }
        Value::Object(object)
    }

    /// Build a tree from JSON. Objects become nodes, anything else a value.
    ///
    /// # Errors
    ///
    /// Returns a `NameError` if an object key is not a valid name token.
    pub fn from_json(value: &Value) -> Result<Meta, NameError> {
        match value {
            Value::Object(object) => {
                let mut node = MetaNode::default();
                for (key, child) in object {
                    if key == VALUE_KEY {
                        node.value = Some(child.clone());
                    } else {
                        node.items.insert(key.parse()?, Meta::from_json(child)?);
                    }
                }
                Ok(Meta(Arc::new(node)))
            }
            other => Ok(Meta::of(other.clone())),
        }
    }
}

fn merge(layers: &[&Meta]) -> Meta {
    let value = layers.iter().find_map(|m| m.0.value.clone());
    let mut keys: Vec<&NameToken> = layers.iter().flat_map(|m| m.0.items.keys()).collect();
    keys.sort();
    keys.dedup();

    let items = keys
        .into_iter()
        .map(|key| {
            let children: Vec<&Meta> = layers.iter().filter_map(|m| m.0.items.get(key)).collect();
            (key.clone(), Meta::laminate(children))
        })
        .collect();
    Meta(Arc::new(MetaNode { value, items }))
}

impl Serialize for Meta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Mutable builder for [`Meta`].
#[derive(Debug, Clone, Default)]
pub struct MetaBuilder {
    value: Option<Value>,
    items: BTreeMap<NameToken, MetaBuilder>,
}

impl MetaBuilder {
    /// Set the value at a dotted path, creating intermediate nodes.
    ///
    /// # Errors
    ///
    /// Returns a `NameError` if `path` does not parse.
    pub fn set(self, path: &str, value: impl Into<Value>) -> Result<Self, NameError> {
        Ok(self.set_name(&Name::parse(path)?, value))
    }

    /// Set the value at `name`, creating intermediate nodes.
    pub fn set_name(mut self, name: &Name, value: impl Into<Value>) -> Self {
        self.node_mut(name).value = Some(value.into());
        self
    }

    /// Graft a whole attribute tree at `name`, replacing what was there.
    pub fn set_meta(mut self, name: &Name, meta: &Meta) -> Self {
        *self.node_mut(name) = meta.to_builder();
        self
    }

    /// Remove the subtree at `name`, if present.
    pub fn remove(mut self, name: &Name) -> Self {
        let Some(last) = name.last() else {
            return MetaBuilder::default();
        };
        let parent = name.cut_last();
        let mut current = &mut self;
        for token in parent.tokens() {
            match current.items.get_mut(token) {
                Some(next) => current = next,
                None => return self,
            }
        }
        current.items.remove(last);
        self
    }

    fn node_mut(&mut self, name: &Name) -> &mut MetaBuilder {
        let mut current = self;
        for token in name.tokens() {
            current = current.items.entry(token.clone()).or_default();
        }
        current
    }

    pub fn build(self) -> Meta {
        Meta(Arc::new(MetaNode {
            value: self.value,
            items: self
                .items
                .into_iter()
                .map(|(k, v)| (k, v.build()))
                .filter(|(_, v)| !v.is_empty())
                .collect(),
        }))
    }
}

/// Read-only layered view over several attribute trees.
///
/// Lookups are resolved lazily; nothing is merged until [`Laminate::to_meta`].
#[derive(Debug, Clone, Default)]
pub struct Laminate {
    layers: Vec<Meta>,
}

impl Laminate {
    pub fn new(layers: impl IntoIterator<Item = Meta>) -> Self {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Add a lowest-priority layer.
    pub fn with_fallback(mut self, layer: Meta) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layers(&self) -> &[Meta] {
        &self.layers
    }

    /// First value defined at `name` across the layers.
    pub fn get_value(&self, name: &Name) -> Option<&Value> {
        self.layers.iter().find_map(|m| m.get_value(name))
    }

    pub fn get_str(&self, name: &Name) -> Option<&str> {
        self.get_value(name).and_then(Value::as_str)
    }

    /// Merged node at `name`.
    pub fn get(&self, name: &Name) -> Option<Meta> {
        let nodes: Vec<&Meta> = self.layers.iter().filter_map(|m| m.get(name)).collect();
        if nodes.is_empty() {
            None
        } else {
            Some(Meta::laminate(nodes))
        }
    }

    pub fn to_meta(&self) -> Meta {
        Meta::laminate(&self.layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn builder_creates_intermediate_nodes() {
        let meta = Meta::builder().set("a.b.c", 1).unwrap().build();
        assert_eq!(meta.get_value(&name("a.b.c")), Some(&json!(1)));
        assert!(meta.get(&name("a.b")).is_some());
        assert!(meta.get_value(&name("a.b")).is_none());
        assert!(meta.get(&name("a.x")).is_none());
    }

    #[test]
    fn laminate_first_layer_wins_and_children_merge() {
        let top = Meta::builder()
            .set("style.color", "red")
            .unwrap()
            .build();
        let bottom = Meta::builder()
            .set("style.color", "blue")
            .unwrap()
            .set("style.width", 2)
            .unwrap()
            .set("label", "x")
            .unwrap()
            .build();

        let merged = Meta::laminate([&top, &bottom]);
        assert_eq!(merged.get_str(&name("style.color")), Some("red"));
        assert_eq!(merged.get_value(&name("style.width")), Some(&json!(2)));
        assert_eq!(merged.get_str(&name("label")), Some("x"));
    }

    #[test]
    fn laminate_view_matches_materialized() {
        let a = Meta::builder().set("k", "a").unwrap().build();
        let b = Meta::builder()
            .set("k", "b")
            .unwrap()
            .set("j", "b")
            .unwrap()
            .build();
        let view = Laminate::new([a, b]);
        assert_eq!(view.get_str(&name("k")), Some("a"));
        assert_eq!(view.get_str(&name("j")), Some("b"));
        assert_eq!(view.to_meta().get_str(&name("j")), Some("b"));
        assert!(view.get(&name("missing")).is_none());
    }

    #[test]
    fn remove_subtree() {
        let meta = Meta::builder()
            .set("a.b", 1)
            .unwrap()
            .set("a.c", 2)
            .unwrap()
            .remove(&name("a.b"))
            .build();
        assert!(meta.get(&name("a.b")).is_none());
        assert_eq!(meta.get_value(&name("a.c")), Some(&json!(2)));
    }

    #[test]
    fn json_round_trip() {
        let meta = Meta::builder()
            .set("a", "x")
            .unwrap()
            .set("b.c", true)
            .unwrap()
            .build();
        let json = meta.to_json();
        assert_eq!(json, json!({"a": "x", "b": {"c": true}}));
        assert_eq!(Meta::from_json(&json).unwrap(), meta);
    }

    #[test]
    fn equality_is_structural() {
        let a = Meta::builder().set("x", 1).unwrap().build();
        let b = Meta::builder().set("x", 1).unwrap().build();
        assert_eq!(a, b);
        assert_ne!(a, Meta::empty());
    }
}
