//! action::reduce
//!
//! One result per group of leaves.
//!
//! Every rule is gathered over the whole source, in order, and each group it
//! produces becomes one result at the group's name, computed from all of the
//! group's leaves at once. Group membership can change with any source
//! update, so every change re-derives every group.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::meta::Meta;
use crate::core::name::Name;
use crate::core::types::{DataType, Value};
use crate::data::Data;
use crate::goal::scope::Scope;
use crate::group::GroupRule;
use crate::tree::{DataTree, TreeError, TreeRef};

use super::{execute, CachingAction, Derived};

/// What the reduce body knows about its group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEnv {
    pub name: Name,
    /// Group attributes laminated over the operator's.
    pub meta: Meta,
}

type ReduceBody<T, R> = Arc<dyn Fn(&GroupEnv, BTreeMap<Name, T>) -> R + Send + Sync>;

/// Lazily join each group of leaves into one value.
///
/// Without any rule the result is empty.
pub struct ReduceAction<T: Value, R: Value> {
    output_type: DataType,
    meta: Meta,
    rules: Vec<GroupRule>,
    body: ReduceBody<T, R>,
}

impl<T: Value, R: Value> ReduceAction<T, R> {
    /// `body` receives the group's values keyed by their source names.
    pub fn new<F>(output_type: DataType, body: F) -> Self
    where
        F: Fn(&GroupEnv, BTreeMap<Name, T>) -> R + Send + Sync + 'static,
    {
        Self {
            output_type,
            meta: Meta::empty(),
            rules: Vec::new(),
            body: Arc::new(body),
        }
    }

    pub fn with_rule(mut self, rule: GroupRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn execute(self, scope: &Scope, source: TreeRef<T>) -> Result<TreeRef<R>, TreeError> {
        execute(Arc::new(self), scope, source)
    }
}

impl<T: Value, R: Value> CachingAction<T, R> for ReduceAction<T, R> {
    fn output_type(&self) -> DataType {
        self.output_type.clone()
    }

    fn derive(&self, source: &dyn DataTree<T>, _key: &Name) -> Result<Vec<Derived<R>>, TreeError> {
        let mut derived = Vec::new();
        for rule in &self.rules {
            for group in rule.gather(source)? {
                let env = Arc::new(GroupEnv {
                    name: group.name().clone(),
                    meta: Meta::laminate([group.meta(), &self.meta]),
                });
                let inputs: BTreeMap<Name, Data<T>> = group
                    .tree()
                    .as_sequence()
                    .into_iter()
                    .map(|item| item.into_parts())
                    .collect();
                let body = Arc::clone(&self.body);
                let body_env = Arc::clone(&env);
                let data = Data::reduce_to_data(
                    inputs,
                    self.output_type.clone(),
                    Some(env.meta.clone()),
                    move |values| body(&body_env, values),
                );
                derived.push(Derived::new(Name::EMPTY, data.named(env.name.clone())));
            }
        }
        Ok(derived)
    }

    fn recompute_key(&self, _changed: &Name) -> Name {
        Name::EMPTY
    }
}

impl<T: Value, R: Value> fmt::Debug for ReduceAction<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceAction")
            .field("output_type", &self.output_type)
            .field("rules", &self.rules)
            .finish()
    }
}
