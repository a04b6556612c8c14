#![forbid(unsafe_code)]

//! Synced cells: cells derived from a source cell.
//!
//! - [`Link`]: two-way. Reads delegate to the source, writes go through to
//!   the source while the link's notification edge is held, so the source's
//!   echo does not make the link notify its own subscribers twice.
//! - [`Prop`]: one-way. Holds its own copy of the source value (a new
//!   identity for object values), refreshed on every upstream change. Local
//!   writes stay local; [`Prop::reset`] is the only way to push upstream.
//! - [`NestedLink`]: binds directly to an [`Observed`](crate::Observed)
//!   object, typically one nested inside another cell's value.
//!
//! Object and primitive variants of `Link` and `Prop` share one
//! implementation; the differences (ownership hooks, shallow copies) come
//! from [`CellValue`](crate::CellValue).
//!
//! # Teardown
//!
//! `about_to_be_deleted` unlinks from the source. A `Prop` that created its
//! own private source (see [`Prop::from_value`]) also tears that source down
//! once nothing else subscribes to it. Dropping a synced cell without an
//! explicit teardown performs the same unlinking.

mod link;
mod nested;
mod prop;

pub use link::Link;
pub use nested::NestedLink;
pub use prop::Prop;
