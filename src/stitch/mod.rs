//! Stitch keys: typed identity values extracted from records
//!
//! A [`KeyPolicy`] says which properties feed which [`KeyKind`]s; extraction
//! turns a record into a set of normalized [`StitchKey`]s that the linker
//! matches on.

mod key;
mod policy;

pub use key::{KeyClass, KeyKind, StitchKey, UnknownKeyKind};
pub use policy::{KeyPolicy, PolicyError};
