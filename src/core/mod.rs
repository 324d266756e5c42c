//! core
//!
//! Strong types shared by every other module.
//!
//! # Modules
//!
//! - [`name`] - Hierarchical names: `Name`, `NameToken`
//! - [`meta`] - Attribute trees and the layered `Laminate` view
//! - [`types`] - Result-type descriptors: `DataType`, `AnyValue`
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Validated newtypes: a `Name` that exists has parsed successfully
//! - Immutable values, shared by `Arc`
//! - Nothing here depends on goals, trees or operators

pub mod config;
pub mod meta;
pub mod name;
pub(crate) mod sync;
pub mod types;
