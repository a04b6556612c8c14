#![forbid(unsafe_code)]

//! Partial-update views for stategraph.
//!
//! This crate provides:
//! - [`ViewArena`] and [`View`]: the component tree, per-element dependency
//!   tracking, and the fixed-point dirty flush
//! - provide/consume, conditional branches and store bindings on [`View`]
//! - [`KeyedList`]: keyed list reconciliation with optional node recycling

pub mod arena;
mod provide;
pub mod reconcile;
pub mod view;

pub use arena::{InstanceGuard, ViewArena, ViewId};
pub use reconcile::{
    ChildFactory, KeyGenerator, KeyedChild, KeyedList, ReconcileError, ReconcileOptions,
    ReconcileReport,
};
pub use view::{UpdateFn, View, WatchFn};
