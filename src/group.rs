//! group
//!
//! Classification of a tree's leaves into named groups.
//!
//! # Rule kinds
//!
//! | Constructor | Buckets | Total |
//! |---|---|---|
//! | [`GroupRule::by_attribute`] | one per distinct attribute value, plus a default | yes |
//! | [`GroupRule::by_extractor`] | one per distinct extracted key, plus a default | yes |
//! | [`GroupRule::fixed`] | one, holding the leaves a predicate accepts | no |
//! | [`GroupRule::whole`] | one, holding every leaf | yes |
//!
//! Total rules place every leaf in exactly one group. [`GroupRule::gather`]
//! is a single pass over the leaves.
//!
//! Classification keys become single-token group names: `%`, `.`, `[`, `]`
//! and a leading `@` are percent-escaped, so `a` and `a.b` land in sibling
//! groups `a` and `a%2Eb` instead of nesting.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::core::meta::Meta;
use crate::core::name::{Name, NameToken, RESERVED_PREFIX};
use crate::core::types::Value;
use crate::tree::{DataTree, StaticDataTree, StaticTreeBuilder, TreeError};

type Extractor = Arc<dyn Fn(&Name, &Meta) -> Option<String> + Send + Sync>;
type LeafPredicate = Arc<dyn Fn(&Name, &Meta) -> bool + Send + Sync>;

/// One bucket produced by a rule.
pub struct Group<T: Value> {
    name: Name,
    tree: StaticDataTree<T>,
    meta: Meta,
}

impl<T: Value> Group<T> {
    /// Result name of the group.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Contributing leaves, under their source names.
    pub fn tree(&self) -> &StaticDataTree<T> {
        &self.tree
    }

    /// Group-level attributes.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }
}

impl<T: Value> fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name.to_string())
            .field("leaves", &self.tree.len())
            .field("meta", &self.meta)
            .finish()
    }
}

#[derive(Clone)]
enum RuleKind {
    Classify {
        extractor: Extractor,
        default: Name,
        key: Option<Name>,
    },
    Fixed {
        name: Name,
        meta: Meta,
        predicate: LeafPredicate,
    },
    Whole {
        name: Name,
        meta: Meta,
    },
}

/// A classification of leaves into named groups.
#[derive(Clone)]
pub struct GroupRule {
    kind: RuleKind,
}

impl GroupRule {
    /// Group by the value of the attribute at `key`.
    ///
    /// String values are used as-is; numbers and booleans use their JSON
    /// text. Leaves without the attribute, or with an empty value, land in
    /// `default`. Each group's attributes record the raw value under `key`.
    pub fn by_attribute(key: Name, default: Name) -> Self {
        let lookup = key.clone();
        Self {
            kind: RuleKind::Classify {
                extractor: Arc::new(move |_: &Name, meta: &Meta| {
                    meta.get_value(&lookup).and_then(attribute_text)
                }),
                default,
                key: Some(key),
            },
        }
    }

    /// Group by an arbitrary key computed from each leaf's name and attributes.
    pub fn by_extractor<F>(extractor: F, default: Name) -> Self
    where
        F: Fn(&Name, &Meta) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            kind: RuleKind::Classify {
                extractor: Arc::new(extractor),
                default,
                key: None,
            },
        }
    }

    /// A single group `name` holding the leaves `predicate` accepts.
    pub fn fixed<F>(name: Name, meta: Meta, predicate: F) -> Self
    where
        F: Fn(&Name, &Meta) -> bool + Send + Sync + 'static,
    {
        Self {
            kind: RuleKind::Fixed {
                name,
                meta,
                predicate: Arc::new(predicate),
            },
        }
    }

    /// A single group `name` holding the whole tree.
    pub fn whole(name: Name, meta: Meta) -> Self {
        Self {
            kind: RuleKind::Whole { name, meta },
        }
    }

    /// Returns true if every leaf lands in exactly one group.
    pub fn is_total(&self) -> bool {
        !matches!(self.kind, RuleKind::Fixed { .. })
    }

    /// Classify every public leaf of `tree`, in group name order.
    pub fn gather<T: Value>(
        &self,
        tree: &(impl DataTree<T> + ?Sized),
    ) -> Result<Vec<Group<T>>, TreeError> {
        let data_type = tree.data_type();
        let mut buckets: BTreeMap<Name, StaticTreeBuilder<T>> = BTreeMap::new();
        let mut labels: BTreeMap<Name, String> = BTreeMap::new();

        if let RuleKind::Fixed { name, .. } | RuleKind::Whole { name, .. } = &self.kind {
            buckets.insert(name.clone(), StaticDataTree::builder(data_type.clone()));
        }

        for item in tree.as_sequence() {
            let bucket = match &self.kind {
                RuleKind::Classify {
                    extractor, default, ..
                } => {
                    let classified = extractor(item.name(), item.meta()).and_then(|text| {
                        let bucket = bucket_name(&text)?;
                        // A default nested under the bucket would collide with it.
                        if bucket != *default && default.starts_with(&bucket) {
                            return None;
                        }
                        Some((bucket, text))
                    });
                    match classified {
                        Some((bucket, text)) => {
                            labels.entry(bucket.clone()).or_insert(text);
                            bucket
                        }
                        None => default.clone(),
                    }
                }
                RuleKind::Fixed {
                    name, predicate, ..
                } => {
                    if !predicate(item.name(), item.meta()) {
                        continue;
                    }
                    name.clone()
                }
                RuleKind::Whole { name, .. } => name.clone(),
            };
            let (name, data) = item.into_parts();
            buckets
                .entry(bucket)
                .or_insert_with(|| StaticDataTree::builder(data_type.clone()))
                .put(&name, data)?;
        }

        Ok(buckets
            .into_iter()
            .map(|(name, builder)| {
                let meta = match &self.kind {
                    RuleKind::Fixed { meta, .. } | RuleKind::Whole { meta, .. } => meta.clone(),
                    RuleKind::Classify { key: Some(key), .. } => {
                        let label = labels.remove(&name).unwrap_or_else(|| name.to_string());
                        Meta::builder().set_name(key, label).build()
                    }
                    RuleKind::Classify { key: None, .. } => Meta::empty(),
                };
                Group {
                    name,
                    tree: builder.build(),
                    meta,
                }
            })
            .collect())
    }
}

impl fmt::Debug for GroupRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RuleKind::Classify { default, key, .. } => f
                .debug_struct("GroupRule::Classify")
                .field("key", &key.as_ref().map(Name::to_string))
                .field("default", &default.to_string())
                .finish(),
            RuleKind::Fixed { name, .. } => f
                .debug_struct("GroupRule::Fixed")
                .field("name", &name.to_string())
                .finish(),
            RuleKind::Whole { name, .. } => f
                .debug_struct("GroupRule::Whole")
                .field("name", &name.to_string())
                .finish(),
        }
    }
}

fn attribute_text(value: &Json) -> Option<String> {
    match value {
        Json::String(text) => Some(text.clone()),
        Json::Number(_) | Json::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

fn bucket_name(text: &str) -> Option<Name> {
    if text.is_empty() {
        return None;
    }
    let mut body = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '%' => body.push_str("%25"),
            '.' => body.push_str("%2E"),
            '[' => body.push_str("%5B"),
            ']' => body.push_str("%5D"),
            c if i == 0 && c == RESERVED_PREFIX => body.push_str("%40"),
            c => body.push(c),
        }
    }
    match NameToken::new(body) {
        Ok(token) => Some(Name::from(token)),
        Err(err) => {
            tracing::debug!(value = text, error = %err, "classification key is not a group name, using default");
            None
        }
    }
}
