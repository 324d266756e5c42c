//! tree::describe
//!
//! Descriptive conversion of a tree into a single attribute document.
//!
//! The document mirrors the tree's shape. Each leaf becomes a node with two
//! reserved children:
//!
//! - `@type` - the leaf's type descriptor name
//! - `@meta` - the leaf's attributes
//!
//! Node attributes attached with `set_node_meta` appear under the node's own
//! `@meta` child. Values are never computed.
//!
//! ```
//! use goaltree::core::meta::Meta;
//! use goaltree::core::name::Name;
//! use goaltree::core::types::DataType;
//! use goaltree::data::Data;
//! use goaltree::tree::describe::describe_json;
//! use goaltree::tree::StaticDataTree;
//!
//! let tree = StaticDataTree::from_sequence(
//!     DataType::of::<u8>(),
//!     vec![Data::of(1u8, Meta::of("first")).named(Name::parse("a").unwrap())],
//! )
//! .unwrap();
//!
//! let doc = describe_json(&tree);
//! assert_eq!(doc["a"]["@type"], "u8");
//! assert_eq!(doc["a"]["@meta"], "first");
//! ```

use serde_json::Value as Json;

use crate::core::meta::{Meta, MetaBuilder};
use crate::core::name::{Name, NameToken};
use crate::core::types::Value;

use super::{DataTree, DataTreeItem};

const TYPE_KEY: &str = "type";

/// Describe every leaf's name, type and attributes.
pub fn describe<T: Value>(tree: &(impl DataTree<T> + ?Sized)) -> Meta {
    walk(tree, &Name::EMPTY, MetaBuilder::default()).build()
}

/// [`describe`] rendered as JSON.
pub fn describe_json<T: Value>(tree: &(impl DataTree<T> + ?Sized)) -> Json {
    describe(tree).to_json()
}

fn walk<T: Value>(
    tree: &(impl DataTree<T> + ?Sized),
    prefix: &Name,
    mut builder: MetaBuilder,
) -> MetaBuilder {
    for (token, item) in tree.entries() {
        let name = prefix.child(token.clone());
        builder = match item {
            // Node attributes keep their reserved name.
            DataTreeItem::Leaf(data) if token.is_reserved() => builder.set_meta(&name, data.meta()),
            DataTreeItem::Leaf(data) => builder
                .set_name(
                    &name.child(NameToken::reserved(TYPE_KEY)),
                    data.data_type().name(),
                )
                .set_meta(&name.child(NameToken::meta()), data.meta()),
            DataTreeItem::Node(sub) => walk(sub.as_ref(), &name, builder),
        };
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DataType;
    use crate::data::Data;
    use crate::goal::GoalError;
    use crate::tree::MutableDataTree;
    use serde_json::json;

    #[test]
    fn lists_types_and_attributes_without_values() {
        let tree: MutableDataTree<i64> = MutableDataTree::new(DataType::tagged::<i64>("count"));
        let computed: Data<i64> = Data::lazy(
            DataType::tagged::<i64>("count"),
            Meta::builder().set("unit", "items").unwrap().build(),
            vec![],
            |_scope| async { Err(GoalError::failed("describe must not compute values")) },
        );
        tree.put(&Name::parse("stats.total").unwrap(), computed).unwrap();
        tree.set_node_meta(
            &Name::parse("stats").unwrap(),
            Meta::builder().set("title", "Stats").unwrap().build(),
        )
        .unwrap();

        let doc = describe_json(&tree);
        assert_eq!(
            doc,
            json!({
                "stats": {
                    "@meta": { "title": "Stats" },
                    "total": {
                        "@type": "i64#count",
                        "@meta": { "unit": "items" }
                    }
                }
            })
        );
    }

    #[test]
    fn empty_tree_describes_to_empty_meta() {
        let tree: MutableDataTree<i32> = MutableDataTree::new(DataType::of::<i32>());
        assert!(describe(&tree).is_empty());
    }
}
