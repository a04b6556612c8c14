#![forbid(unsafe_code)]

//! Identifier newtypes.
//!
//! Subscribers (cells, views, user callbacks) and rendered elements are named
//! by monotonically increasing integers issued by a [`StateContext`]. Ids are
//! never reused for the lifetime of the context, so ascending numeric order is
//! creation order.
//!
//! [`StateContext`]: crate::StateContext

use std::cell::Cell;
use std::fmt;

/// Unique identity of a subscriber in a [`Registry`](crate::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Wrap a raw id. Intended for hosts that mirror ids across a boundary.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a rendered element (one update function inside a view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Wrap a raw element id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "elmt#{}", self.0)
    }
}

/// Monotonic counter. Never wraps in practice; saturates rather than reuse.
#[derive(Debug)]
pub(crate) struct IdCounter {
    next: Cell<u64>,
}

impl IdCounter {
    pub(crate) const fn starting_at(first: u64) -> Self {
        Self {
            next: Cell::new(first),
        }
    }

    pub(crate) fn next(&self) -> u64 {
        let id = self.next.get();
        self.next.set(id.saturating_add(1));
        id
    }

    pub(crate) fn peek(&self) -> u64 {
        self.next.get()
    }
}
