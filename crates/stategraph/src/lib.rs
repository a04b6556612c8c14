#![forbid(unsafe_code)]

//! Reactive state propagation for declarative UI runtimes.
//!
//! `stategraph` tracks reads and writes of state cells, makes in-place
//! mutation of objects observable, keeps derived cells in sync across
//! component boundaries, and re-renders only the elements that read a
//! changed cell.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use stategraph::prelude::*;
//!
//! let ctx = StateContext::new();
//! let arena = ViewArena::new(&ctx);
//! let counter = arena.create_view("Counter", None);
//! let count = counter.create_state(0, "count");
//!
//! let c = Rc::clone(&count);
//! let label = counter.observe_component_creation(move |_, _, _| {
//!     let _text = format!("clicked {} times", c.get());
//! });
//!
//! count.set(1);
//! assert_eq!(counter.dirty_elements(), vec![label]);
//! counter.update_dirty_elements();
//! assert!(!counter.has_dirty_elements());
//! ```
//!
//! # Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `stategraph-core` | cells, observed wrappers, links/props, stores |
//! | `stategraph-view` | views, dirty flush, keyed list reconciliation |

pub use stategraph_core::{
    AbstractProperty, CellValue, ElementId, FnSubscriber, Link, NestedLink, Notification,
    NotifyToken, Observed, ObservedProperty, Prop, Registry, RenderTracker, Roles, SourceRef,
    StateConfig, StateContext, StateError, Storage, Subscriber, SubscriberId, TrackedProperty,
    observed_fields,
};
pub use stategraph_view::{
    ChildFactory, KeyGenerator, KeyedChild, KeyedList, ReconcileError, ReconcileOptions,
    ReconcileReport, View, ViewArena, ViewId,
};

/// The traits and types most programs need.
pub mod prelude {
    pub use stategraph_core::{
        AbstractProperty, CellValue, Observed, ObservedProperty, StateConfig, StateContext,
        StateError, Subscriber, TrackedProperty, observed_fields,
    };
    pub use stategraph_view::{ChildFactory, KeyGenerator, KeyedList, View, ViewArena};
}
