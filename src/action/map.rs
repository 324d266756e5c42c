//! action::map
//!
//! One result per source leaf.
//!
//! Each result is `source.transform(output_type, attributes, body)` placed
//! at the source leaf's name. Its attributes are the source leaf's
//! attributes laminated over the operator's, so the source wins on
//! conflicts. An optional environment hook may rename or re-attribute each
//! item before the result is built.

use std::fmt;
use std::sync::Arc;

use crate::core::meta::Meta;
use crate::core::name::Name;
use crate::core::types::{DataType, Value};
use crate::goal::scope::Scope;
use crate::tree::{DataTree, TreeError, TreeRef};

use super::{execute, leaves_under, CachingAction, Derived};

/// Per-item environment seen by the hook and the body.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEnv {
    /// Result name, initially the source name.
    pub name: Name,
    /// Result attributes, initially the merged attributes.
    pub meta: Meta,
}

type MapBody<T, R> = Arc<dyn Fn(T, &MapEnv) -> R + Send + Sync>;
type EnvHook = Arc<dyn Fn(&mut MapEnv) + Send + Sync>;

/// Lazily transform every leaf.
pub struct MapAction<T: Value, R: Value> {
    output_type: DataType,
    meta: Meta,
    env_hook: Option<EnvHook>,
    body: MapBody<T, R>,
}

impl<T: Value, R: Value> MapAction<T, R> {
    pub fn new<F>(output_type: DataType, body: F) -> Self
    where
        F: Fn(T, &MapEnv) -> R + Send + Sync + 'static,
    {
        Self {
            output_type,
            meta: Meta::empty(),
            env_hook: None,
            body: Arc::new(body),
        }
    }

    /// Operator-level attributes, overridden by each leaf's own.
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Adjust each item's environment before its result is built.
    pub fn with_env<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut MapEnv) + Send + Sync + 'static,
    {
        self.env_hook = Some(Arc::new(hook));
        self
    }

    pub fn execute(self, scope: &Scope, source: TreeRef<T>) -> Result<TreeRef<R>, TreeError> {
        execute(Arc::new(self), scope, source)
    }
}

impl<T: Value, R: Value> CachingAction<T, R> for MapAction<T, R> {
    fn output_type(&self) -> DataType {
        self.output_type.clone()
    }

    fn derive(&self, source: &dyn DataTree<T>, key: &Name) -> Result<Vec<Derived<R>>, TreeError> {
        let mut derived = Vec::new();
        for item in leaves_under(source, key) {
            let mut env = MapEnv {
                name: item.name().clone(),
                meta: Meta::laminate([item.meta(), &self.meta]),
            };
            if let Some(hook) = &self.env_hook {
                hook(&mut env);
            }

            let body = Arc::clone(&self.body);
            let body_env = Arc::new(env.clone());
            let data = item.transform(self.output_type.clone(), env.meta, move |value| {
                body(value, &body_env)
            });
            derived.push(Derived::new(item.name().clone(), data.named(env.name)));
        }
        Ok(derived)
    }
}

impl<T: Value, R: Value> fmt::Debug for MapAction<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapAction")
            .field("output_type", &self.output_type)
            .field("meta", &self.meta)
            .field("env_hook", &self.env_hook.is_some())
            .finish()
    }
}
