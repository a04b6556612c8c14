#![forbid(unsafe_code)]

//! Observable state cells for stategraph.
//!
//! This crate provides:
//! - [`ObservedProperty`] state cells with equality-gated, synchronous change
//!   notification and per-element read tracking
//! - [`Observed`] wrappers that make in-place mutation of objects, arrays and
//!   dates observable
//! - [`Link`] (two-way), [`Prop`] (one-way) and [`NestedLink`] synced cells
//! - [`Storage`] named stores, including the application-wide store on
//!   [`StateContext`]
//!
//! Everything is single-threaded: cells are `Rc`-shared and resolve each
//! other through the context's weak [`Registry`].

mod cell;
mod config;
mod context;
mod error;
mod id;
pub mod observed;
mod registry;
mod storage;
mod subscriber;
pub mod synced;
mod tracker;
mod value;

pub use cell::{AbstractProperty, ObservedProperty, SourceRef, TrackedProperty};
pub use config::StateConfig;
pub use context::StateContext;
pub use error::StateError;
pub use id::{ElementId, SubscriberId};
pub use observed::{Observed, OwnerSet, Spliced};
pub use registry::Registry;
pub use storage::{Storage, StoreEntry};
pub use subscriber::{FnSubscriber, Notification, NotifyToken, Roles, Subscriber, dispatch};
pub use synced::{Link, NestedLink, Prop};
pub use tracker::{ReadEdge, RenderScope, RenderTracker};
pub use value::CellValue;
