//! goaltree - lazy, memoized computations arranged in named trees
//!
//! Every leaf of a tree is a [`goal::Goal`]: an asynchronous computation that
//! starts only when asked, runs at most once until reset, and is cancelled
//! when one of its dependencies fails. Operators derive new trees from old
//! ones without computing anything, and keep derived trees current when the
//! source changes.
//!
//! # Architecture
//!
//! Modules depend only on the ones listed above them:
//!
//! - [`core`] - Names, attribute trees, type descriptors, configuration
//! - [`goal`] - The computation primitive, scopes and handles
//! - [`data`] - Goals annotated with a type descriptor and attributes
//! - [`tree`] - Snapshot, mutable and filtered trees, update streams
//! - [`group`] - Classification of leaves into named buckets
//! - [`action`] - Map, reduce, split and filter operators
//!
//! # Example
//!
//! ```
//! use goaltree::action::map::MapAction;
//! use goaltree::core::meta::Meta;
//! use goaltree::core::name::Name;
//! use goaltree::core::types::DataType;
//! use goaltree::data::Data;
//! use goaltree::goal::scope::Scope;
//! use goaltree::tree::{DataTree, MutableDataTree};
//!
//! # tokio_test::block_on(async {
//! let scope = Scope::current().unwrap();
//! let source = MutableDataTree::new(DataType::of::<i32>());
//! source.put(&Name::parse("a").unwrap(), Data::of(1, Meta::empty())).unwrap();
//!
//! let doubled = MapAction::new(DataType::of::<i32>(), |v: i32, _env| v * 2)
//!     .execute(&scope, source.share())
//!     .unwrap();
//!
//! let a = doubled.read(&Name::parse("a").unwrap()).unwrap();
//! assert_eq!(a.await_value(&scope).await.unwrap(), 2);
//! scope.cancel();
//! # });
//! ```

pub mod action;
pub mod core;
pub mod data;
pub mod goal;
pub mod group;
pub mod tree;
