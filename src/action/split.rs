//! action::split
//!
//! A fixed set of named fragments per source leaf.
//!
//! The fan-out width is the number of declared fragments, whatever the
//! source holds. A fragment's result sits at the fragment's name; the source
//! leaf's name is not kept, so several source leaves feeding the same
//! fragment overwrite each other and the last write wins.

use std::fmt;
use std::sync::Arc;

use crate::core::meta::Meta;
use crate::core::name::Name;
use crate::core::types::{DataType, Value};
use crate::goal::scope::Scope;
use crate::tree::{DataTree, TreeError, TreeRef};

use super::{execute, leaves_under, CachingAction, Derived};

type FragmentFn<T, R> = Arc<dyn Fn(T) -> R + Send + Sync>;

struct Fragment<T, R> {
    name: Name,
    meta: Meta,
    transform: FragmentFn<T, R>,
}

/// Lazily split every leaf into declared fragments.
pub struct SplitAction<T: Value, R: Value> {
    output_type: DataType,
    meta: Meta,
    fragments: Vec<Fragment<T, R>>,
}

impl<T: Value, R: Value> SplitAction<T, R> {
    pub fn new(output_type: DataType) -> Self {
        Self {
            output_type,
            meta: Meta::empty(),
            fragments: Vec::new(),
        }
    }

    /// Declare a fragment. `meta` overrides the source leaf's attributes.
    pub fn fragment<F>(mut self, name: Name, meta: Meta, transform: F) -> Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.fragments.push(Fragment {
            name,
            meta,
            transform: Arc::new(transform),
        });
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

impl<T: Value, R: Value> CachingAction<T, R> for SplitAction<T, R> {
    fn output_type(&self) -> DataType {
        self.output_type.clone()
    }

    fn derive(&self, source: &dyn DataTree<T>, key: &Name) -> Result<Vec<Derived<R>>, TreeError> {
        let mut derived = Vec::new();
        for item in leaves_under(source, key) {
            for fragment in &self.fragments {
                let meta = Meta::laminate([&fragment.meta, item.meta(), &self.meta]);
                let transform = Arc::clone(&fragment.transform);
                let data = item.transform(self.output_type.clone(), meta, move |value| {
                    transform(value)
                });
                derived.push(Derived::new(
                    item.name().clone(),
                    data.named(fragment.name.clone()),
                ));
            }
        }
        Ok(derived)
    }
}

impl<T: Value, R: Value> fmt::Debug for SplitAction<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fragments: Vec<String> = self
            .fragments
            .iter()
            .map(|fragment| fragment.name.to_string())
            .collect();
        f.debug_struct("SplitAction")
            .field("output_type", &self.output_type)
            .field("fragments", &fragments)
            .finish()
    }
}
