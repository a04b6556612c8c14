#![forbid(unsafe_code)]

//! Id-keyed view arena.
//!
//! The arena owns every live [`View`]. Views refer to their parent and
//! children by [`ViewId`] and resolve them here, so the tree holds no
//! reference cycles and a dropped arena drops the whole tree.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use stategraph_core::{ElementId, StateContext, SubscriberId};

use crate::view::View;

/// Identity of a view. Views are registry subscribers, so this is the
/// view's subscriber id.
pub type ViewId = SubscriberId;

pub(crate) struct ArenaInner {
    pub(crate) ctx: StateContext,
    views: RefCell<BTreeMap<ViewId, Rc<View>>>,
    pub(crate) active: Cell<Option<ViewId>>,
}

/// Owner of all views of one UI instance.
#[derive(Clone)]
pub struct ViewArena {
    inner: Rc<ArenaInner>,
}

impl ViewArena {
    #[must_use]
    pub fn new(ctx: &StateContext) -> Self {
        Self {
            inner: Rc::new(ArenaInner {
                ctx: ctx.clone(),
                views: RefCell::new(BTreeMap::new()),
                active: Cell::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<ArenaInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<ArenaInner> {
        &self.inner
    }

    #[must_use]
    pub fn ctx(&self) -> &StateContext {
        &self.inner.ctx
    }

    /// Create a view. A child inherits its parent's provided variables and
    /// local store, and is added to the parent's children.
    pub fn create_view(&self, name: impl Into<String>, parent: Option<&View>) -> Rc<View> {
        let view = View::new(self, name.into(), parent);
        self.inner
            .views
            .borrow_mut()
            .insert(view.id(), Rc::clone(&view));
        if let Some(parent) = parent {
            parent.add_child(view.id());
        }
        tracing::debug!(view = %view.id(), name = view.name(), "view created");
        view
    }

    #[must_use]
    pub fn get(&self, id: ViewId) -> Option<Rc<View>> {
        self.inner.views.borrow().get(&id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: ViewId) -> bool {
        self.inner.views.borrow().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.views.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.views.borrow().is_empty()
    }

    /// Ids of all views, ascending.
    #[must_use]
    pub fn view_ids(&self) -> Vec<ViewId> {
        self.inner.views.borrow().keys().copied().collect()
    }

    /// Views without a parent, ascending.
    #[must_use]
    pub fn roots(&self) -> Vec<ViewId> {
        self.inner
            .views
            .borrow()
            .values()
            .filter(|view| view.parent().is_none())
            .map(|view| view.id())
            .collect()
    }

    /// The view whose notification handler is running, if any.
    #[must_use]
    pub fn active_view(&self) -> Option<ViewId> {
        self.inner.active.get()
    }

    pub(crate) fn remove(&self, id: ViewId) -> Option<Rc<View>> {
        self.inner.views.borrow_mut().remove(&id)
    }

    /// Host notification: `element` left the rendered tree.
    pub fn delete_element(&self, element: ElementId) {
        self.inner.ctx.tracker().element_deleted(element);
    }

    /// Let every view drop its bookkeeping for deleted elements, then forget
    /// the deleted ids no view owned.
    pub fn purge_deleted_element_ids(&self) -> Vec<ElementId> {
        let mut removed = Vec::new();
        for view in self.snapshot() {
            removed.extend(view.purge_deleted_element_ids());
        }
        let unowned = self.inner.ctx.tracker().deleted_element_ids();
        if !unowned.is_empty() {
            tracing::trace!(count = unowned.len(), "forgetting deleted elements owned by no view");
            self.inner.ctx.tracker().element_ids_purged(&unowned);
        }
        removed.sort_unstable();
        removed
    }

    /// Flush every dirty view until no view has dirty elements.
    ///
    /// Returns the number of rounds run. Capped at
    /// [`StateConfig::max_flush_passes`](stategraph_core::StateConfig).
    /// Ends with [`purge_deleted_element_ids`](Self::purge_deleted_element_ids),
    /// so no deleted id outlives a flush.
    pub fn flush_dirty_views(&self) -> usize {
        let max_rounds = self.inner.ctx.config().max_flush_passes;
        let mut rounds = 0;
        loop {
            let dirty: Vec<Rc<View>> = self
                .snapshot()
                .into_iter()
                .filter(|view| view.has_dirty_elements())
                .collect();
            if dirty.is_empty() {
                break;
            }
            if rounds == max_rounds {
                tracing::error!(
                    rounds,
                    views = dirty.len(),
                    "flush_dirty_views: round limit reached, views left dirty"
                );
                break;
            }
            rounds += 1;
            for view in dirty {
                view.update_dirty_elements();
            }
        }
        self.purge_deleted_element_ids();
        rounds
    }

    /// Delete every view, roots first recursing into children.
    pub fn teardown(&self) {
        for root in self.roots() {
            if let Some(view) = self.get(root) {
                view.about_to_be_deleted();
            }
        }
        self.purge_deleted_element_ids();
    }

    fn snapshot(&self) -> Vec<Rc<View>> {
        self.inner.views.borrow().values().cloned().collect()
    }
}

impl fmt::Debug for ViewArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewArena")
            .field("views", &self.view_ids())
            .field("active", &self.inner.active.get())
            .finish()
    }
}

/// Marks a view as the active instance; restores the previous one on drop.
#[must_use = "the instance is restored as soon as the guard is dropped"]
pub struct InstanceGuard {
    arena: Option<Rc<ArenaInner>>,
    previous: Option<ViewId>,
}

impl InstanceGuard {
    pub(crate) fn enter(arena: Option<Rc<ArenaInner>>, view: ViewId) -> Self {
        let previous = arena
            .as_ref()
            .and_then(|arena| arena.active.replace(Some(view)));
        Self { arena, previous }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        if let Some(arena) = &self.arena {
            arena.active.set(self.previous);
        }
    }
}
