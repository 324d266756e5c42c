//! Property-based tests for names, attributes, trees and operators.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use goaltree::action::map::{MapAction, MapEnv};
use goaltree::action::reduce::{GroupEnv, ReduceAction};
use goaltree::core::meta::Meta;
use goaltree::core::name::{Name, NameToken};
use goaltree::core::types::DataType;
use goaltree::data::Data;
use goaltree::goal::scope::Scope;
use goaltree::group::GroupRule;
use goaltree::tree::{DataTree, MutableDataTree, StaticDataTree};

/// Strategy for token bodies: no separators, no brackets, never reserved.
fn token_body() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,7}"
}

/// Strategy for a single token, sometimes indexed.
fn token() -> impl Strategy<Value = NameToken> {
    (token_body(), prop::option::of("[0-9a-z]{1,3}")).prop_map(|(body, index)| match index {
        Some(index) => NameToken::indexed(body, index).unwrap(),
        None => NameToken::new(body).unwrap(),
    })
}

/// Strategy for non-empty names of up to four tokens.
fn name() -> impl Strategy<Value = Name> {
    prop::collection::vec(token(), 1..5).prop_map(Name::from_tokens)
}

/// Strategy for distinct two-token names.
///
/// All leaves sit at the same depth so no name is a prefix of another.
fn leaf_names() -> impl Strategy<Value = BTreeSet<Name>> {
    prop::collection::btree_set((token(), token()), 0..24).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(a, b)| Name::from_tokens([a, b]))
            .collect()
    })
}

/// Strategy for flat attribute maps with a handful of known keys.
fn flat_meta() -> impl Strategy<Value = BTreeMap<String, i64>> {
    prop::collection::btree_map(
        prop::sample::select(vec!["unit", "color", "size", "owner", "rank"]),
        any::<i64>(),
        0..5,
    )
    .prop_map(|map| map.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn build_meta(values: &BTreeMap<String, i64>) -> Meta {
    let mut builder = Meta::builder();
    for (key, value) in values {
        builder = builder.set(key, *value).unwrap();
    }
    builder.build()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// =============================================================================
// Names
// =============================================================================

proptest! {
    /// Displaying then parsing yields the same name.
    #[test]
    fn name_text_round_trip(name in name()) {
        let text = name.to_string();
        let parsed = Name::parse(&text).unwrap();
        prop_assert_eq!(parsed, name);
    }

    /// `plus` then `strip_prefix` recovers the suffix.
    #[test]
    fn strip_prefix_inverts_plus(prefix in name(), suffix in name()) {
        let joined = prefix.plus(&suffix);
        prop_assert!(joined.starts_with(&prefix));
        prop_assert_eq!(joined.strip_prefix(&prefix), Some(suffix.clone()));
        prop_assert_eq!(joined.len(), prefix.len() + suffix.len());
    }

    /// Generated names never count as reserved.
    #[test]
    fn plain_names_are_not_reserved(name in name()) {
        prop_assert!(!name.is_reserved());
        prop_assert!(name.child(NameToken::meta()).is_reserved());
    }
}

// =============================================================================
// Attributes
// =============================================================================

proptest! {
    /// Every key resolves to the first layer defining it.
    #[test]
    fn laminate_first_defined_wins(
        first in flat_meta(),
        second in flat_meta(),
        third in flat_meta(),
    ) {
        let layers = [build_meta(&first), build_meta(&second), build_meta(&third)];
        let merged = Meta::laminate(&layers);

        let keys: BTreeSet<&String> = first.keys().chain(second.keys()).chain(third.keys()).collect();
        for key in keys {
            let expected = first
                .get(key)
                .or_else(|| second.get(key))
                .or_else(|| third.get(key))
                .copied();
            let actual = merged
                .get_value(&Name::parse(key).unwrap())
                .and_then(|v| v.as_i64());
            prop_assert_eq!(actual, expected);
        }
    }

    /// Laminating with empty layers changes nothing.
    #[test]
    fn laminate_ignores_empty_layers(values in flat_meta()) {
        let meta = build_meta(&values);
        let empty = Meta::empty();
        prop_assert_eq!(Meta::laminate([&empty, &meta, &empty]), meta);
    }
}

// =============================================================================
// Trees
// =============================================================================

proptest! {
    /// Every written leaf reads back as the same lazy value.
    #[test]
    fn tree_write_then_read_returns_same_goal(names in leaf_names()) {
        let tree = MutableDataTree::new(DataType::of::<i64>());
        let mut written = BTreeMap::new();
        for (i, name) in names.iter().enumerate() {
            let data = Data::of(i as i64, Meta::empty());
            written.insert(name.clone(), data.goal().id());
            tree.put(name, data).unwrap();
        }

        for (name, id) in &written {
            let read = tree.read(name).unwrap();
            prop_assert_eq!(read.goal().id(), *id);
        }
        prop_assert_eq!(tree.as_sequence().len(), names.len());
    }

    /// A snapshot keeps its contents after the source is cleared.
    #[test]
    fn snapshot_survives_source_removal(names in leaf_names()) {
        let tree = MutableDataTree::new(DataType::of::<i64>());
        for name in &names {
            tree.put(name, Data::of(1i64, Meta::empty())).unwrap();
        }
        let snapshot = tree.snapshot();
        for name in &names {
            tree.remove(name).unwrap();
        }

        prop_assert!(tree.as_sequence().is_empty());
        let kept: BTreeSet<Name> = snapshot
            .as_sequence()
            .into_iter()
            .map(|item| item.name().clone())
            .collect();
        prop_assert_eq!(kept, names);
    }
}

// =============================================================================
// Operators
// =============================================================================

proptest! {
    /// Map yields exactly one result per source leaf, at the same name.
    #[test]
    fn map_preserves_name_set(names in leaf_names()) {
        let rt = runtime();
        let scope = Scope::new(rt.handle().clone());
        let source = StaticDataTree::from_sequence(
            DataType::of::<i64>(),
            names.iter().map(|n| Data::of(2, Meta::empty()).named(n.clone())),
        )
        .unwrap();

        let result = MapAction::new(DataType::of::<String>(), |v: i64, _: &MapEnv| v.to_string())
            .execute(&scope, source.share())
            .unwrap();

        let mapped: BTreeSet<Name> = result
            .as_sequence()
            .into_iter()
            .map(|item| item.name().clone())
            .collect();
        prop_assert_eq!(mapped, names);
    }

    /// Attribute grouping places every leaf in exactly one group.
    #[test]
    fn attribute_grouping_is_a_partition(
        leaves in prop::collection::btree_map(
            (token(), token()).prop_map(|(a, b)| Name::from_tokens([a, b])),
            prop::option::of(prop::sample::select(vec!["red", "green", "blue", "", "a.b", "@x"])),
            0..24,
        )
    ) {
        let mut builder = StaticDataTree::builder(DataType::of::<i64>());
        for (name, color) in &leaves {
            let meta = match color {
                Some(color) => Meta::builder().set("color", *color).unwrap().build(),
                None => Meta::empty(),
            };
            builder.put(name, Data::of(0i64, meta)).unwrap();
        }
        let tree = builder.build();

        let rule = GroupRule::by_attribute(Name::parse("color").unwrap(), Name::parse("other").unwrap());
        let groups = rule.gather(&tree).unwrap();

        let mut seen: Vec<Name> = groups
            .iter()
            .flat_map(|group| group.tree().as_sequence())
            .map(|item| item.name().clone())
            .collect();
        seen.sort();
        let expected: Vec<Name> = leaves.keys().cloned().collect();
        prop_assert_eq!(seen, expected);
        prop_assert!(groups.iter().all(|group| !group.tree().is_empty()));
    }

    /// Reducing by attribute counts every leaf once, whatever the values.
    #[test]
    fn attribute_reduce_counts_every_leaf(
        leaves in prop::collection::btree_map(
            (token(), token()).prop_map(|(a, b)| Name::from_tokens([a, b])),
            prop::option::of(prop::sample::select(vec!["a", "a.b", "a.b.c", "", "@x", "other", "%2E"])),
            0..24,
        )
    ) {
        let rt = runtime();
        let scope = Scope::new(rt.handle().clone());
        let mut builder = StaticDataTree::builder(DataType::of::<i64>());
        for (name, label) in &leaves {
            let meta = match label {
                Some(label) => Meta::builder().set("label", *label).unwrap().build(),
                None => Meta::empty(),
            };
            builder.put(name, Data::of(1, meta)).unwrap();
        }
        let tree = builder.build();

        let counts = ReduceAction::new(
            DataType::of::<i64>(),
            |_: &GroupEnv, values: BTreeMap<Name, i64>| -> i64 { values.values().sum() },
        )
        .with_rule(GroupRule::by_attribute(Name::parse("label").unwrap(), Name::parse("other").unwrap()))
        .execute(&scope, tree.share());
        prop_assert!(counts.is_ok());
        let counts = counts.unwrap();

        let total: i64 = rt.block_on(async {
            let mut total = 0;
            for item in counts.as_sequence() {
                total += item.await_value(&scope).await.unwrap();
            }
            total
        });
        prop_assert_eq!(total, leaves.len() as i64);
    }
}
