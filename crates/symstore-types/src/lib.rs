//! Foundation types for SymStore.
//!
//! This crate provides the identity and value types shared by the store
//! engine and its tooling. Raw records arrive as `serde_json::Value` trees
//! and are parsed here, once, into a tagged representation so the engine
//! never has to re-inspect JSON shapes.
//!
//! # Key Types
//!
//! - [`TypeName`]: Name of a model type (one entity collection)
//! - [`EntityId`]: Caller-supplied identity of a record within its type
//! - [`Scalar`]: A leaf field value (null, bool, number, string)
//! - [`RawRecord`] / [`RawValue`]: A parsed, not yet normalized, record tree
//! - [`RawFormat`]: Key names and the transient prefix used while parsing

pub mod error;
pub mod identity;
pub mod raw;
pub mod scalar;

pub use error::{Result, TypeError};
pub use identity::{EntityId, TypeName};
pub use raw::{RawFormat, RawRecord, RawValue};
pub use scalar::Scalar;
