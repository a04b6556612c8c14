#![forbid(unsafe_code)]

//! Render-target tracking.
//!
//! The rendering host runs each element's update function inside a
//! [`RenderScope`]. While a scope is active, any cell read records a
//! dependency edge between that cell and the scope's element. Scopes nest
//! like a call stack: creating a child element from inside a parent's update
//! function records reads against the child until the child's scope ends.
//!
//! The tracker also keeps the set of elements the host has deleted since the
//! last flush, so views can drop stale update functions before re-rendering.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Weak;

use crate::cell::TrackedProperty;
use crate::id::{ElementId, IdCounter, SubscriberId};

/// A cell read while an element was rendering.
#[derive(Clone)]
pub struct ReadEdge {
    /// The cell that was read.
    pub cell: SubscriberId,
    /// Handle used to purge the edge from the cell's side.
    pub handle: Weak<dyn TrackedProperty>,
}

impl fmt::Debug for ReadEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadEdge").field("cell", &self.cell).finish()
    }
}

struct Frame {
    element: ElementId,
    reads: Vec<ReadEdge>,
}

/// Stack of elements currently rendering, plus host deletions.
pub struct RenderTracker {
    element_ids: IdCounter,
    stack: RefCell<Vec<Frame>>,
    deleted: RefCell<BTreeSet<ElementId>>,
}

impl RenderTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            element_ids: IdCounter::starting_at(1),
            stack: RefCell::new(Vec::new()),
            deleted: RefCell::new(BTreeSet::new()),
        }
    }

    /// Issue the id for a newly created element.
    pub fn allocate_element_id(&self) -> ElementId {
        ElementId::new(self.element_ids.next())
    }

    /// The id the next [`allocate_element_id`](Self::allocate_element_id) call returns.
    #[must_use]
    pub fn next_element_id(&self) -> ElementId {
        ElementId::new(self.element_ids.peek())
    }

    /// The element currently being rendered, if any.
    #[must_use]
    pub fn current(&self) -> Option<ElementId> {
        self.stack.borrow().last().map(|frame| frame.element)
    }

    /// Whether any element is rendering.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        !self.stack.borrow().is_empty()
    }

    /// Make `element` the current render target until the scope ends.
    pub fn enter(&self, element: ElementId) -> RenderScope<'_> {
        self.stack.borrow_mut().push(Frame {
            element,
            reads: Vec::new(),
        });
        RenderScope {
            tracker: self,
            element,
            finished: false,
        }
    }

    /// Record that `cell` was read. Returns the element to add to the
    /// cell's dependent set, or `None` outside of rendering.
    pub fn record_read(
        &self,
        cell: SubscriberId,
        handle: Weak<dyn TrackedProperty>,
    ) -> Option<ElementId> {
        let mut stack = self.stack.borrow_mut();
        let frame = stack.last_mut()?;
        if !frame.reads.iter().any(|edge| edge.cell == cell) {
            frame.reads.push(ReadEdge { cell, handle });
        }
        Some(frame.element)
    }

    /// Host notification: `element` was removed from the rendered tree.
    ///
    /// The id stays in the deleted set until a purge reports it through
    /// [`element_ids_purged`](Self::element_ids_purged). View flushes purge
    /// on every pass; a host that deletes elements without flushing must
    /// purge itself or the set keeps growing.
    pub fn element_deleted(&self, element: ElementId) {
        self.deleted.borrow_mut().insert(element);
    }

    /// Elements deleted and not yet purged, ascending.
    #[must_use]
    pub fn deleted_element_ids(&self) -> Vec<ElementId> {
        self.deleted.borrow().iter().copied().collect()
    }

    /// Whether `element` is awaiting purge.
    #[must_use]
    pub fn is_deleted(&self, element: ElementId) -> bool {
        self.deleted.borrow().contains(&element)
    }

    /// Forget deleted ids once their owner has purged them.
    pub fn element_ids_purged(&self, elements: &[ElementId]) {
        let mut deleted = self.deleted.borrow_mut();
        for element in elements {
            deleted.remove(element);
        }
    }

    fn pop(&self, element: ElementId) -> Vec<ReadEdge> {
        let mut stack = self.stack.borrow_mut();
        match stack.pop() {
            Some(frame) if frame.element == element => frame.reads,
            Some(frame) => {
                tracing::error!(
                    expected = %element,
                    found = %frame.element,
                    "render scope closed out of order"
                );
                frame.reads
            }
            None => Vec::new(),
        }
    }
}

impl Default for RenderTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RenderTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTracker")
            .field("current", &self.current())
            .field("depth", &self.stack.borrow().len())
            .field("deleted", &self.deleted.borrow().len())
            .finish()
    }
}

/// RAII render target. Pops its frame on drop.
#[must_use = "reads are only attributed while the scope is alive"]
pub struct RenderScope<'a> {
    tracker: &'a RenderTracker,
    element: ElementId,
    finished: bool,
}

impl RenderScope<'_> {
    /// The element this scope renders.
    #[must_use]
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// End the scope and return the cells read inside it.
    pub fn finish(mut self) -> Vec<ReadEdge> {
        self.finished = true;
        self.tracker.pop(self.element)
    }
}

impl Drop for RenderScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.pop(self.element);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dangling() -> Weak<dyn TrackedProperty> {
        Weak::<crate::cell::ObservedProperty<i32>>::new()
    }

    #[test]
    fn scopes_nest_like_a_stack() {
        let tracker = RenderTracker::new();
        assert_eq!(tracker.current(), None);
        let outer_id = tracker.allocate_element_id();
        let outer = tracker.enter(outer_id);
        assert_eq!(tracker.current(), Some(outer_id));
        {
            let inner_id = tracker.allocate_element_id();
            let _inner = tracker.enter(inner_id);
            assert_eq!(tracker.current(), Some(inner_id));
        }
        assert_eq!(tracker.current(), Some(outer_id));
        drop(outer);
        assert!(!tracker.is_rendering());
    }

    #[test]
    fn reads_go_to_the_innermost_scope_once() {
        let tracker = RenderTracker::new();
        let cell = SubscriberId::new(5);
        assert_eq!(tracker.record_read(cell, dangling()), None);

        let element = tracker.allocate_element_id();
        let scope = tracker.enter(element);
        assert_eq!(tracker.record_read(cell, dangling()), Some(element));
        assert_eq!(tracker.record_read(cell, dangling()), Some(element));
        let reads = scope.finish();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].cell, cell);
    }

    #[test]
    fn element_ids_are_ascending() {
        let tracker = RenderTracker::new();
        let a = tracker.allocate_element_id();
        assert_eq!(tracker.next_element_id(), ElementId::new(a.get() + 1));
        let b = tracker.allocate_element_id();
        assert!(a < b);
    }

    #[test]
    fn deleted_ids_are_tracked_until_purged() {
        let tracker = RenderTracker::new();
        let a = ElementId::new(3);
        let b = ElementId::new(1);
        tracker.element_deleted(a);
        tracker.element_deleted(b);
        assert_eq!(tracker.deleted_element_ids(), vec![b, a]);
        tracker.element_ids_purged(&[a]);
        assert!(!tracker.is_deleted(a));
        assert!(tracker.is_deleted(b));
    }
}
