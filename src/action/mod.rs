//! action
//!
//! Operators deriving one tree from another.
//!
//! # Operators
//!
//! - [`map::MapAction`] - one result per leaf, same name
//! - [`reduce::ReduceAction`] - one result per group of leaves
//! - [`split::SplitAction`] - a fixed set of named fragments per leaf
//! - [`filter::FilterAction`] - stateless predicate view
//!
//! The first three implement [`CachingAction`] and run through [`execute`],
//! which never computes a value: every result leaf is a new lazy goal
//! depending on source goals.
//!
//! # Recompute on change
//!
//! A static source yields a [`StaticDataTree`]. An observable source yields a
//! [`MutableDataTree`] kept current by a watcher task spawned on a child of
//! the caller's scope; cancelling that scope stops the watcher.
//!
//! Each result entry remembers the source leaves (its origins) it was
//! derived from. On a change at `name` the watcher:
//!
//! 1. maps `name` to a recompute key ([`CachingAction::recompute_key`])
//! 2. derives fresh results for everything under the key
//! 3. writes each fresh result once
//! 4. removes results whose every origin lay under the key and that were not
//!    produced again
//! 5. re-derives, from the surviving origins, any result whose stored value
//!    came from an origin under the key
//!
//! One source event therefore causes at most one event per affected result
//! name. Separate source events touching the same result each cause their
//! own event, so consumers must tolerate repeated notifications. When two
//! origins produce the same result name the last write wins, and removing
//! that writer falls back to another origin's derivation.
//!
//! A watcher that lags behind its source re-derives everything.

pub mod filter;
pub mod map;
pub mod reduce;
pub mod split;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::core::name::Name;
use crate::core::types::{DataType, Value};
use crate::data::NamedData;
use crate::goal::scope::Scope;
use crate::tree::{
    DataTree, MutableDataTree, StaticDataTree, TreeError, TreeRef, Updates, UpdatesError,
};

/// One derived result and the source name it came from.
pub struct Derived<R: Value> {
    pub origin: Name,
    pub result: NamedData<R>,
}

impl<R: Value> Derived<R> {
    pub fn new(origin: Name, result: NamedData<R>) -> Self {
        Self { origin, result }
    }
}

/// An operator that can re-derive part of its output after a source change.
pub trait CachingAction<T: Value, R: Value>: Send + Sync + 'static {
    /// Descriptor of every result leaf.
    fn output_type(&self) -> DataType;

    /// Results for everything in `source` under `key`.
    ///
    /// `key` is [`Name::EMPTY`] for the initial derivation.
    fn derive(&self, source: &dyn DataTree<T>, key: &Name) -> Result<Vec<Derived<R>>, TreeError>;

    /// The part of the source to re-derive after a change at `changed`.
    fn recompute_key(&self, changed: &Name) -> Name {
        changed.clone()
    }
}

/// Run `action` over `source`.
///
/// # Errors
///
/// Fails if the initial results collide structurally (e.g. one result name
/// is a prefix of another).
pub fn execute<T, R, A>(action: Arc<A>, scope: &Scope, source: TreeRef<T>) -> Result<TreeRef<R>, TreeError>
where
    T: Value,
    R: Value,
    A: CachingAction<T, R>,
{
    let Some(updates) = source.updates() else {
        let mut builder = StaticDataTree::builder(action.output_type());
        for derived in action.derive(source.as_ref(), &Name::EMPTY)? {
            let (name, data) = derived.result.into_parts();
            builder.put(&name, data)?;
        }
        return Ok(Arc::new(builder.build()));
    };

    let result = MutableDataTree::new(action.output_type());
    let mut cache = Recompute {
        action,
        source,
        result: result.clone(),
        provenance: BTreeMap::new(),
    };
    let initial = cache.action.derive(cache.source.as_ref(), &Name::EMPTY)?;
    cache.apply(&Name::EMPTY, initial)?;

    scope.child().spawn(cache.run(updates));
    Ok(Arc::new(result))
}

/// Source leaves at or under `key`, named relative to the source root.
pub(crate) fn leaves_under<T: Value>(source: &dyn DataTree<T>, key: &Name) -> Vec<NamedData<T>> {
    if key.is_reserved() {
        return Vec::new();
    }
    if !key.is_empty() {
        if let Some(data) = source.read(key) {
            return vec![data.named(key.clone())];
        }
    }
    source
        .branch(key)
        .as_sequence()
        .into_iter()
        .map(|item| {
            let name = key.plus(item.name());
            item.rename(name)
        })
        .collect()
}

struct Recompute<T: Value, R: Value, A> {
    action: Arc<A>,
    source: TreeRef<T>,
    result: MutableDataTree<R>,
    provenance: BTreeMap<Name, Provenance>,
}

/// Where one result entry came from.
#[derive(Debug, Default)]
struct Provenance {
    /// Source names that produce this result.
    origins: BTreeSet<Name>,
    /// The origin whose derivation is currently stored.
    writer: Name,
}

impl<T, R, A> Recompute<T, R, A>
where
    T: Value,
    R: Value,
    A: CachingAction<T, R>,
{
    async fn run(mut self, mut updates: Updates) {
        loop {
            let key = match updates.recv().await {
                Ok(changed) => {
                    let key = self.action.recompute_key(&changed);
                    tracing::debug!(changed = %changed, key = %key, "re-deriving after update");
                    key
                }
                Err(UpdatesError::Lagged(dropped)) => {
                    tracing::debug!(dropped, "re-deriving everything after lag");
                    Name::EMPTY
                }
                Err(UpdatesError::Closed) => break,
            };
            if let Err(err) = self.refresh(&key) {
                tracing::warn!(key = %key, error = %err, "failed to re-derive results");
            }
        }
    }

    fn refresh(&mut self, key: &Name) -> Result<(), TreeError> {
        let fresh = self.action.derive(self.source.as_ref(), key)?;
        self.apply(key, fresh)
    }

    fn apply(&mut self, key: &Name, fresh: Vec<Derived<R>>) -> Result<(), TreeError> {
        let mut stale = BTreeSet::new();
        for (name, entry) in self.provenance.iter_mut() {
            let before = entry.origins.len();
            entry.origins.retain(|origin| !origin.starts_with(key));
            if entry.origins.len() != before {
                stale.insert(name.clone());
            }
        }

        let mut first_error = None;
        for derived in fresh {
            let (name, data) = derived.result.into_parts();
            stale.remove(&name);
            match self.result.write(&name, Some(data)) {
                Ok(()) => {
                    let entry = self.provenance.entry(name).or_default();
                    entry.origins.insert(derived.origin.clone());
                    entry.writer = derived.origin;
                }
                Err(err) => {
                    tracing::warn!(name = %name, error = %err, "dropping derived result");
                    first_error.get_or_insert(err);
                }
            }
        }

        for name in stale {
            let Some(entry) = self.provenance.get(&name) else {
                continue;
            };
            if entry.origins.is_empty() {
                self.provenance.remove(&name);
                self.result.write(&name, None)?;
            } else if entry.writer.starts_with(key) {
                self.restore(&name)?;
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Re-derive `name` from its surviving origins after its writer went away.
    ///
    /// The last surviving origin in name order wins. Origins that no longer
    /// produce `name` are forgotten.
    fn restore(&mut self, name: &Name) -> Result<(), TreeError> {
        let origins: Vec<Name> = self
            .provenance
            .get(name)
            .map(|entry| entry.origins.iter().cloned().collect())
            .unwrap_or_default();

        let mut producing = BTreeSet::new();
        let mut winner = None;
        for origin in origins {
            for derived in self.action.derive(self.source.as_ref(), &origin)? {
                if derived.result.name() == name {
                    producing.insert(derived.origin.clone());
                    winner = Some(derived);
                }
            }
        }

        let Some(derived) = winner else {
            self.provenance.remove(name);
            return self.result.write(name, None);
        };
        tracing::debug!(name = %name, writer = %derived.origin, "restoring result from surviving origin");
        let writer = derived.origin.clone();
        self.result.write(name, Some(derived.result.into_data()))?;
        self.provenance.insert(
            name.clone(),
            Provenance {
                origins: producing,
                writer,
            },
        );
        Ok(())
    }
}
