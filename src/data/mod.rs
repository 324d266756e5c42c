//! data
//!
//! A [`Goal`] annotated with a result-type descriptor and attributes.
//!
//! # Types
//!
//! - [`Data`] - goal + [`DataType`] + [`Meta`]
//! - [`NamedData`] - `Data` placed at a hierarchical [`Name`]
//!
//! # Derived data
//!
//! The derivation methods never touch their inputs. Each returns a new lazy
//! `Data` whose goal depends on the inputs' goals:
//!
//! - [`Data::transform`] - one input
//! - [`Data::combine`] - two inputs
//! - [`Data::reduce_to_data`] / [`Data::join_list`] - N inputs
//!
//! # Example
//!
//! ```
//! use goaltree::core::meta::Meta;
//! use goaltree::data::Data;
//! use goaltree::goal::scope::Scope;
//!
//! # tokio_test::block_on(async {
//! let scope = Scope::current().unwrap();
//! let width = Data::of(3, Meta::empty());
//! let height = Data::of(4, Meta::empty());
//!
//! let area = width.combine(&height, Meta::empty(), |w, h| w * h);
//! let label = area.map(|a| format!("{} m2", a));
//!
//! assert_eq!(label.await_value(&scope).await.unwrap(), "12 m2");
//! # });
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use crate::core::meta::{Meta, MetaBuilder};
use crate::core::name::{Name, NameToken};
use crate::core::types::{AnyValue, DataType, Value};
use crate::goal::scope::Scope;
use crate::goal::{Dependency, Goal, GoalError, GoalHandle};

/// Token body used to key list inputs by ordinal.
const LIST_INPUT_BODY: &str = "data";

/// A goal with a type descriptor and an attribute map.
pub struct Data<T: Value> {
    goal: Goal<T>,
    data_type: DataType,
    meta: Meta,
}

impl<T: Value> Data<T> {
    /// Data whose value is known up front.
    pub fn of(value: T, meta: Meta) -> Self {
        Self::from_goal(Goal::of(value), DataType::of::<T>(), meta)
    }

    /// Data backed by an existing goal.
    pub fn from_goal(goal: Goal<T>, data_type: DataType, meta: Meta) -> Self {
        Self {
            goal,
            data_type,
            meta,
        }
    }

    /// Data computed lazily by `body` after `dependencies` are started.
    pub fn lazy<F, Fut>(
        data_type: DataType,
        meta: Meta,
        dependencies: Vec<Dependency>,
        body: F,
    ) -> Self
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, GoalError>> + Send + 'static,
    {
        Self::from_goal(Goal::lazy(dependencies, body), data_type, meta)
    }

    /// A value-less placeholder carrying only attributes.
    ///
    /// Computing it fails with `GoalError::EmptyAccess`.
    pub fn empty(meta: Meta) -> Self {
        let goal = Goal::lazy(vec![], |_scope: Scope| async {
            Err(GoalError::EmptyAccess(
                "attribute-only entry has no value".into(),
            ))
        });
        Self::from_goal(goal, DataType::of::<T>(), meta)
    }

    pub fn goal(&self) -> &Goal<T> {
        &self.goal
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn as_dependency(&self) -> Dependency {
        self.goal.as_dependency()
    }

    pub fn start(&self, scope: &Scope) -> Result<GoalHandle<T>, GoalError> {
        self.goal.start(scope)
    }

    pub async fn await_value(&self, scope: &Scope) -> Result<T, GoalError> {
        self.goal.await_value(scope).await
    }

    /// Same goal with different attributes.
    pub fn with_meta(&self, meta: Meta) -> Self {
        Self {
            goal: self.goal.clone(),
            data_type: self.data_type.clone(),
            meta,
        }
    }

    /// Place this data at `name`.
    pub fn named(self, name: Name) -> NamedData<T> {
        NamedData { name, data: self }
    }

    /// Lazily map the value with a fallible function.
    pub fn try_transform<R, F>(&self, data_type: DataType, meta: Meta, f: F) -> Data<R>
    where
        R: Value,
        F: Fn(T) -> Result<R, GoalError> + Send + Sync + 'static,
    {
        let source = self.goal.clone();
        let f = Arc::new(f);
        Data::lazy(data_type, meta, vec![self.as_dependency()], move |scope: Scope| {
            let source = source.clone();
            let f = Arc::clone(&f);
            async move { f(source.await_value(&scope).await?) }
        })
    }

    /// Lazily map the value.
    pub fn transform<R, F>(&self, data_type: DataType, meta: Meta, f: F) -> Data<R>
    where
        R: Value,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.try_transform(data_type, meta, move |value| Ok(f(value)))
    }

    /// Lazily map the value, keeping the attributes and deriving the type from `R`.
    pub fn map<R, F>(&self, f: F) -> Data<R>
    where
        R: Value,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.transform(DataType::of::<R>(), self.meta.clone(), f)
    }

    /// Lazily combine with another input.
    pub fn combine<U, R, F>(&self, other: &Data<U>, meta: Meta, f: F) -> Data<R>
    where
        U: Value,
        R: Value,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        let left = self.goal.clone();
        let right = other.goal.clone();
        let f = Arc::new(f);
        Data::lazy(
            DataType::of::<R>(),
            meta,
            vec![self.as_dependency(), other.as_dependency()],
            move |scope: Scope| {
                let left = left.clone();
                let right = right.clone();
                let f = Arc::clone(&f);
                async move {
                    let l = left.await_value(&scope).await?;
                    let r = right.await_value(&scope).await?;
                    Ok(f(l, r))
                }
            },
        )
    }

    /// Lazily join many named inputs into one value.
    ///
    /// With `meta = None` the result's attributes aggregate each input's
    /// attributes under the input's name.
    pub fn reduce_to_data<R, F>(
        inputs: BTreeMap<Name, Data<T>>,
        data_type: DataType,
        meta: Option<Meta>,
        f: F,
    ) -> Data<R>
    where
        R: Value,
        F: Fn(BTreeMap<Name, T>) -> R + Send + Sync + 'static,
    {
        let meta = meta.unwrap_or_else(|| {
            inputs
                .iter()
                .fold(MetaBuilder::default(), |builder, (name, data)| {
                    builder.set_meta(name, data.meta())
                })
                .build()
        });
        let dependencies = inputs.values().map(Data::as_dependency).collect();
        let goals: Arc<Vec<(Name, Goal<T>)>> = Arc::new(
            inputs
                .into_iter()
                .map(|(name, data)| (name, data.goal))
                .collect(),
        );
        let f = Arc::new(f);
        Data::lazy(data_type, meta, dependencies, move |scope: Scope| {
            let goals = Arc::clone(&goals);
            let f = Arc::clone(&f);
            async move {
                let mut values = BTreeMap::new();
                for (name, goal) in goals.iter() {
                    values.insert(name.clone(), goal.await_value(&scope).await?);
                }
                Ok(f(values))
            }
        })
    }

    /// Lazily join an ordered list of inputs.
    ///
    /// Inputs are keyed `data[0]`, `data[1]`, ... for attribute aggregation.
    pub fn join_list<R, F>(inputs: Vec<Data<T>>, meta: Option<Meta>, f: F) -> Data<R>
    where
        R: Value,
        F: Fn(Vec<T>) -> R + Send + Sync + 'static,
    {
        let names: Vec<Name> = (0..inputs.len())
            .filter_map(|i| NameToken::indexed(LIST_INPUT_BODY, i.to_string()).ok())
            .map(Name::from)
            .collect();
        let keyed: BTreeMap<Name, Data<T>> = names.iter().cloned().zip(inputs).collect();
        Data::reduce_to_data(keyed, DataType::of::<R>(), meta, move |mut values| {
            f(names.iter().filter_map(|name| values.remove(name)).collect())
        })
    }

    /// Erase the value type.
    pub fn erase(&self) -> Data<AnyValue> {
        self.transform(self.data_type.erased(), self.meta.clone(), |value| {
            Arc::new(value) as AnyValue
        })
    }
}

impl Data<AnyValue> {
    /// Recover a typed view of erased data.
    ///
    /// # Errors
    ///
    /// Returns `GoalError::TypeMismatch` immediately when the descriptor
    /// shows the erased type is not `R`. Data erased without a descriptor
    /// is checked when the value is computed instead.
    pub fn downcast<R: Value>(&self) -> Result<Data<R>, GoalError> {
        let expected = DataType::of::<R>();
        if let Some(inner) = self.data_type.erased_type_id() {
            if inner != expected.type_id() {
                return Err(GoalError::TypeMismatch {
                    expected: expected.name(),
                    actual: self.data_type.name(),
                });
            }
        }
        let data_type = match self.data_type.tag() {
            Some(tag) => DataType::tagged::<R>(tag.to_string()),
            None => expected.clone(),
        };
        Ok(self.try_transform(data_type, self.meta.clone(), move |value| {
            value
                .downcast::<R>()
                .map(|typed| (*typed).clone())
                .map_err(|_| GoalError::TypeMismatch {
                    expected: expected.name(),
                    actual: "erased value of another type".into(),
                })
        }))
    }
}

impl<T: Value> Clone for Data<T> {
    fn clone(&self) -> Self {
        Self {
            goal: self.goal.clone(),
            data_type: self.data_type.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<T: Value> fmt::Debug for Data<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("type", &self.data_type)
            .field("meta", &self.meta)
            .field("goal", &self.goal)
            .finish()
    }
}

/// [`Data`] at a hierarchical name.
///
/// Renaming shares the underlying goal.
pub struct NamedData<T: Value> {
    name: Name,
    data: Data<T>,
}

impl<T: Value> NamedData<T> {
    pub fn new(name: Name, data: Data<T>) -> Self {
        Self { name, data }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn data(&self) -> &Data<T> {
        &self.data
    }

    pub fn into_data(self) -> Data<T> {
        self.data
    }

    pub fn into_parts(self) -> (Name, Data<T>) {
        (self.name, self.data)
    }

    /// Same data at a different name.
    pub fn rename(&self, name: Name) -> NamedData<T> {
        NamedData {
            name,
            data: self.data.clone(),
        }
    }
}

impl<T: Value> Deref for NamedData<T> {
    type Target = Data<T>;

    fn deref(&self) -> &Data<T> {
        &self.data
    }
}

impl<T: Value> Clone for NamedData<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            data: self.data.clone(),
        }
    }
}

impl<T: Value> fmt::Debug for NamedData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedData")
            .field("name", &self.name.to_string())
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalStatus;
    use serde_json::json;

    fn meta(key: &str, value: &str) -> Meta {
        Meta::builder().set(key, value).unwrap().build()
    }

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[tokio::test]
    async fn transform_is_lazy_and_pure() {
        let scope = Scope::current().unwrap();
        let source: Data<i32> = Data::lazy(
            DataType::of::<i32>(),
            meta("unit", "m"),
            vec![],
            |_scope: Scope| async { Ok(21) },
        );
        let doubled = source.transform(DataType::of::<i32>(), Meta::empty(), |v| v * 2);

        assert!(source.goal().current_handle().is_none());
        assert!(doubled.goal().current_handle().is_none());

        assert_eq!(doubled.await_value(&scope).await.unwrap(), 42);
        assert_eq!(source.meta().get_str(&name("unit")), Some("m"));
        assert_eq!(doubled.goal().dependencies().len(), 1);
    }

    #[tokio::test]
    async fn combine_two_types() {
        let scope = Scope::current().unwrap();
        let word = Data::of("ab".to_string(), Meta::empty());
        let count = Data::of(3usize, Meta::empty());
        let repeated = word.combine(&count, Meta::empty(), |w, n| w.repeat(n));
        assert_eq!(repeated.await_value(&scope).await.unwrap(), "ababab");
        assert_eq!(repeated.data_type(), &DataType::of::<String>());
    }

    #[tokio::test]
    async fn reduce_aggregates_meta_by_name() {
        let scope = Scope::current().unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert(name("a"), Data::of(1, meta("tag", "first")));
        inputs.insert(name("b"), Data::of(2, meta("tag", "second")));

        let total = Data::reduce_to_data(inputs, DataType::of::<i32>(), None, |values| {
            values.values().sum::<i32>()
        });
        assert_eq!(total.await_value(&scope).await.unwrap(), 3);
        assert_eq!(total.meta().get_str(&name("a.tag")), Some("first"));
        assert_eq!(total.meta().get_str(&name("b.tag")), Some("second"));
    }

    #[tokio::test]
    async fn join_list_preserves_order() {
        let scope = Scope::current().unwrap();
        let inputs: Vec<Data<String>> = (0..12)
            .map(|i| Data::of(i.to_string(), Meta::empty()))
            .collect();
        let joined = Data::join_list(inputs, None, |values| values.join(","));
        assert_eq!(
            joined.await_value(&scope).await.unwrap(),
            "0,1,2,3,4,5,6,7,8,9,10,11"
        );
    }

    #[tokio::test]
    async fn empty_placeholder_fails() {
        let scope = Scope::current().unwrap();
        let placeholder: Data<i32> = Data::empty(meta("title", "node"));
        let err = placeholder.await_value(&scope).await.unwrap_err();
        assert!(matches!(err, GoalError::EmptyAccess(_)));
        assert_eq!(
            placeholder.goal().current_handle().unwrap().status(),
            GoalStatus::Failed
        );
    }

    #[tokio::test]
    async fn erase_and_downcast() {
        let scope = Scope::current().unwrap();
        let data = Data::of(5u64, meta("k", "v"));
        let erased = data.erase();
        assert_eq!(erased.data_type().erased_type_id(), Some(std::any::TypeId::of::<u64>()));

        let back = erased.downcast::<u64>().unwrap();
        assert_eq!(back.await_value(&scope).await.unwrap(), 5);
        assert_eq!(back.meta().get_value(&name("k")), Some(&json!("v")));

        assert!(matches!(
            erased.downcast::<String>(),
            Err(GoalError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn downcast_checks_at_access_without_descriptor() {
        let scope = Scope::current().unwrap();
        let opaque: Data<AnyValue> = Data::of(Arc::new(1i32) as AnyValue, Meta::empty());
        let wrong = opaque.downcast::<String>().unwrap();
        assert!(matches!(
            wrong.await_value(&scope).await,
            Err(GoalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn rename_shares_goal() {
        let data = Data::of(1, Meta::empty()).named(name("x"));
        let renamed = data.rename(name("y"));
        assert_eq!(renamed.name(), &name("y"));
        assert_eq!(renamed.goal().id(), data.goal().id());
    }
}
