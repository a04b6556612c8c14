#![forbid(unsafe_code)]

//! Partial-update views.
//!
//! A [`View`] is one component instance. Its content is a set of elements,
//! each with an update function. While an update function runs, every cell
//! it reads records an edge to that element; when such a cell changes, the
//! view receives the affected element ids and marks them dirty. A flush then
//! re-runs only the dirty update functions.
//!
//! # Flush
//!
//! [`View::update_dirty_elements`] repeats until the dirty set is empty:
//!
//! 1. purge elements the host deleted since the last pass;
//! 2. snapshot the dirty ids in ascending order (creation order, so parents
//!    before children);
//! 3. run each update function and remove its id from the dirty set.
//!
//! Update functions may dirty further elements; those are picked up by the
//! next pass. The number of passes is capped by
//! [`StateConfig::max_flush_passes`](stategraph_core::StateConfig).
//!
//! # Full-update mode
//!
//! With `partial_update` off, cells keep no element edges. The view instead
//! remembers the names of the cells read while any of its elements rendered;
//! a change to one of them marks the view as needing an update and dirties
//! every element it owns.
//!
//! # Invariants
//!
//! 1. Only elements owned by this view are ever marked dirty here.
//! 2. No element is marked dirty while the view is in its first render.
//! 3. A purged element has no update function, no read edges and no dirty
//!    entry, and no cell lists it as a dependent.
//! 4. No `RefCell` borrow of view state is held while an update function,
//!    watch callback or branch renderer runs.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `update_element` for an unknown element | error logged, returns `false` |
//! | flush exceeds the pass cap | error logged, remaining ids stay dirty |
//! | provided name already taken | [`StateError::DuplicateProvide`] |
//! | consumed name not provided | [`StateError::MissingProvide`] |
//! | consumed name has another type | [`StateError::ProvideTypeMismatch`] |

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use stategraph_core::{
    CellValue, ElementId, Link, NestedLink, Notification, Observed, ObservedProperty, Prop,
    ReadEdge, Roles, SourceRef, StateContext, StateError, Storage, Subscriber, SubscriberId,
    TrackedProperty,
};

use crate::arena::{ArenaInner, InstanceGuard, ViewArena, ViewId};
use crate::provide::ProvidedVars;
use crate::reconcile::{ChildFactory, KeyGenerator, KeyedList, ReconcileError, ReconcileReport};

/// An element's update function: `(view, element, is_first_render)`.
pub type UpdateFn = Rc<dyn Fn(&View, ElementId, bool)>;

/// A watch callback: `(view, changed cell name)`.
pub type WatchFn = Rc<dyn Fn(&View, &str)>;

#[derive(Debug)]
struct Branch {
    id: u32,
    children: Vec<ElementId>,
}

/// One component instance in the view tree.
pub struct View {
    id: ViewId,
    name: String,
    ctx: StateContext,
    arena: Weak<ArenaInner>,
    parent: Cell<Option<ViewId>>,
    children: RefCell<BTreeSet<ViewId>>,
    update_funcs: RefCell<BTreeMap<ElementId, UpdateFn>>,
    element_reads: RefCell<BTreeMap<ElementId, Vec<ReadEdge>>>,
    dirty: RefCell<BTreeSet<ElementId>>,
    subscribed: RefCell<BTreeMap<SubscriberId, Weak<dyn TrackedProperty>>>,
    watches: RefCell<AHashMap<String, WatchFn>>,
    provided: RefCell<ProvidedVars>,
    local_storage: RefCell<Option<Rc<Storage>>>,
    state_vars: RefCell<Vec<Rc<dyn TrackedProperty>>>,
    branches: RefCell<BTreeMap<ElementId, Branch>>,
    for_each: RefCell<BTreeMap<ElementId, KeyedList<Vec<ElementId>>>>,
    element_children: RefCell<BTreeMap<ElementId, Vec<ElementId>>>,
    element_parent: RefCell<BTreeMap<ElementId, ElementId>>,
    render_stack: RefCell<Vec<ElementId>>,
    created_log: RefCell<Vec<Vec<ElementId>>>,
    props_used_for_render: RefCell<BTreeSet<String>>,
    need_update: Cell<bool>,
    first_render: Cell<bool>,
    deleted: Cell<bool>,
}

impl View {
    pub(crate) fn new(arena: &ViewArena, name: String, parent: Option<&View>) -> Rc<Self> {
        let ctx = arena.ctx().clone();
        let (provided, local_storage) = match parent {
            Some(parent) => (
                parent.provided.borrow().clone(),
                parent.local_storage.borrow().clone(),
            ),
            None => (ProvidedVars::new(), None),
        };
        let view = Rc::new(Self {
            id: ctx.registry().make_id(),
            name,
            arena: Rc::downgrade(arena.inner()),
            parent: Cell::new(None),
            children: RefCell::new(BTreeSet::new()),
            update_funcs: RefCell::new(BTreeMap::new()),
            element_reads: RefCell::new(BTreeMap::new()),
            dirty: RefCell::new(BTreeSet::new()),
            subscribed: RefCell::new(BTreeMap::new()),
            watches: RefCell::new(AHashMap::new()),
            provided: RefCell::new(provided),
            local_storage: RefCell::new(local_storage),
            state_vars: RefCell::new(Vec::new()),
            branches: RefCell::new(BTreeMap::new()),
            for_each: RefCell::new(BTreeMap::new()),
            element_children: RefCell::new(BTreeMap::new()),
            element_parent: RefCell::new(BTreeMap::new()),
            render_stack: RefCell::new(Vec::new()),
            created_log: RefCell::new(Vec::new()),
            props_used_for_render: RefCell::new(BTreeSet::new()),
            need_update: Cell::new(false),
            first_render: Cell::new(false),
            deleted: Cell::new(false),
            ctx,
        });
        view.ctx.registry().add(&view);
        view
    }

    #[must_use]
    pub fn id(&self) -> ViewId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ctx(&self) -> &StateContext {
        &self.ctx
    }

    /// The arena owning this view, while it is alive.
    #[must_use]
    pub fn arena(&self) -> Option<ViewArena> {
        self.arena.upgrade().map(ViewArena::from_inner)
    }

    // -----------------------------------------------------------------------
    // Tree
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn parent(&self) -> Option<ViewId> {
        self.parent.get()
    }

    #[must_use]
    pub fn parent_view(&self) -> Option<Rc<View>> {
        self.parent.get().and_then(|id| self.arena()?.get(id))
    }

    /// Child ids, ascending.
    #[must_use]
    pub fn children(&self) -> Vec<ViewId> {
        self.children.borrow().iter().copied().collect()
    }

    /// A live child of this view.
    #[must_use]
    pub fn child(&self, id: ViewId) -> Option<Rc<View>> {
        if !self.children.borrow().contains(&id) {
            return None;
        }
        self.arena()?.get(id)
    }

    /// Adopt `child`. Returns `false` if it is already a child.
    pub fn add_child(&self, child: ViewId) -> bool {
        if !self.children.borrow_mut().insert(child) {
            tracing::warn!(view = %self.id, child = %child, "add_child: child already present");
            return false;
        }
        if let Some(view) = self.arena().and_then(|arena| arena.get(child)) {
            view.set_parent(Some(self.id));
        }
        true
    }

    /// Release `child`. Returns `false` if it is not a child.
    pub fn remove_child(&self, child: ViewId) -> bool {
        if !self.children.borrow_mut().remove(&child) {
            tracing::warn!(view = %self.id, child = %child, "remove_child: unknown child");
            return false;
        }
        if let Some(view) = self.arena().and_then(|arena| arena.get(child)) {
            view.set_parent(None);
        }
        true
    }

    fn set_parent(&self, parent: Option<ViewId>) {
        if let (Some(current), Some(next)) = (self.parent.get(), parent) {
            tracing::warn!(view = %self.id, from = %current, to = %next, "changing parent");
        }
        self.parent.set(parent);
    }

    fn child_views(&self) -> Vec<Rc<View>> {
        let Some(arena) = self.arena() else {
            return Vec::new();
        };
        self.children()
            .into_iter()
            .filter_map(|id| arena.get(id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Run the view's first render. Cell changes during it do not mark
    /// elements dirty.
    pub fn initial_render(&self, render: impl FnOnce(&View)) {
        let previous = self.first_render.replace(true);
        render(self);
        self.first_render.set(previous);
    }

    #[must_use]
    pub fn is_first_render(&self) -> bool {
        self.first_render.get()
    }

    /// Create an element: allocate its id, run `update(view, id, true)` with
    /// the element as render target, then keep `update` for re-renders.
    ///
    /// An element created while another element of this view renders becomes
    /// its child; purging an element purges its children too.
    pub fn observe_component_creation(
        &self,
        update: impl Fn(&View, ElementId, bool) + 'static,
    ) -> ElementId {
        let element = self.ctx.tracker().allocate_element_id();
        self.adopt_element(element);
        let update: UpdateFn = Rc::new(update);
        tracing::debug!(view = %self.id, element = %element, "first render of element");
        self.render_element(element, &update, true);
        self.update_funcs.borrow_mut().insert(element, update);
        element
    }

    /// Re-run the update function of `element`.
    pub fn update_element(&self, element: ElementId) -> bool {
        let update = self.update_funcs.borrow().get(&element).cloned();
        let Some(update) = update else {
            tracing::error!(
                view = %self.id,
                name = %self.name,
                element = %element,
                "update function not found"
            );
            return false;
        };
        tracing::trace!(view = %self.id, element = %element, "update element");
        self.render_element(element, &update, false);
        true
    }

    fn render_element(&self, element: ElementId, update: &UpdateFn, first_render: bool) {
        let scope = self.ctx.tracker().enter(element);
        self.render_stack.borrow_mut().push(element);
        update(self, element, first_render);
        self.render_stack.borrow_mut().pop();
        let reads = scope.finish();
        self.record_reads(element, reads);
    }

    fn is_rendering(&self) -> bool {
        !self.render_stack.borrow().is_empty()
    }

    fn adopt_element(&self, element: ElementId) {
        let parent = self.render_stack.borrow().last().copied();
        if let Some(parent) = parent {
            self.element_children
                .borrow_mut()
                .entry(parent)
                .or_default()
                .push(element);
            self.element_parent.borrow_mut().insert(element, parent);
        }
        if let Some(frame) = self.created_log.borrow_mut().last_mut() {
            frame.push(element);
        }
    }

    /// Run `render` and return the elements this view created meanwhile.
    /// Elements of other views are not included.
    fn collect_created(&self, render: impl FnOnce()) -> Vec<ElementId> {
        self.created_log.borrow_mut().push(Vec::new());
        render();
        self.created_log.borrow_mut().pop().unwrap_or_default()
    }

    /// Children of `element` created during its renders, ascending.
    #[must_use]
    pub fn child_elements(&self, element: ElementId) -> Vec<ElementId> {
        let mut children = self
            .element_children
            .borrow()
            .get(&element)
            .cloned()
            .unwrap_or_default();
        children.sort_unstable();
        children
    }

    fn record_reads(&self, element: ElementId, reads: Vec<ReadEdge>) {
        if reads.is_empty() {
            return;
        }
        if !self.ctx.config().partial_update {
            let mut used = self.props_used_for_render.borrow_mut();
            for edge in &reads {
                if let Some(cell) = edge.handle.upgrade() {
                    used.insert(cell.info().to_owned());
                }
            }
        }
        let mut fresh = Vec::new();
        {
            let mut subscribed = self.subscribed.borrow_mut();
            for edge in &reads {
                if !subscribed.contains_key(&edge.cell) {
                    subscribed.insert(edge.cell, edge.handle.clone());
                    fresh.push(edge.handle.clone());
                }
            }
        }
        {
            let mut element_reads = self.element_reads.borrow_mut();
            let edges = element_reads.entry(element).or_default();
            for edge in reads {
                if !edges.iter().any(|known| known.cell == edge.cell) {
                    edges.push(edge);
                }
            }
        }
        for handle in fresh {
            if let Some(cell) = handle.upgrade() {
                cell.subscribe_me(self.id);
            }
        }
    }

    /// Ids of elements owned by this view, ascending.
    #[must_use]
    pub fn element_ids(&self) -> Vec<ElementId> {
        self.update_funcs.borrow().keys().copied().collect()
    }

    #[must_use]
    pub fn has_element(&self, element: ElementId) -> bool {
        self.update_funcs.borrow().contains_key(&element)
    }

    /// Cells read by `element` across its renders.
    #[must_use]
    pub fn reads_of(&self, element: ElementId) -> Vec<SubscriberId> {
        self.element_reads
            .borrow()
            .get(&element)
            .map(|edges| edges.iter().map(|edge| edge.cell).collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Dirty tracking
    // -----------------------------------------------------------------------

    /// A cell named `name` changed; `elements` depend on it.
    pub fn view_property_has_changed(&self, name: &str, elements: &[ElementId]) {
        let _instance = self.sync_instance_id();
        let own: Vec<ElementId> = {
            let funcs = self.update_funcs.borrow();
            elements
                .iter()
                .copied()
                .filter(|element| funcs.contains_key(element))
                .collect()
        };
        if !own.is_empty() && !self.first_render.get() {
            let mut dirty = self.dirty.borrow_mut();
            if dirty.is_empty() {
                self.mark_need_update();
            }
            dirty.extend(own);
            tracing::debug!(view = %self.id, cell = name, dirty = dirty.len(), "elements dirtied");
        }
        let watch = self.watches.borrow().get(name).cloned();
        if let Some(watch) = watch {
            tracing::trace!(view = %self.id, cell = name, "running watch");
            watch(self, name);
        }
    }

    /// Full-update mode: the cell named `name` changed.
    ///
    /// If any element read that cell during its last render, the view is
    /// flagged for update and all of its elements are marked dirty. Watches
    /// run either way.
    pub fn property_has_changed(&self, name: &str) {
        let _instance = self.sync_instance_id();
        let used = self.props_used_for_render.borrow().contains(name);
        if used && !self.first_render.get() {
            let elements = self.element_ids();
            let mut dirty = self.dirty.borrow_mut();
            if dirty.is_empty() {
                self.mark_need_update();
            }
            dirty.extend(elements);
            tracing::debug!(
                view = %self.id,
                cell = name,
                dirty = dirty.len(),
                "full rerender queued"
            );
        }
        let watch = self.watches.borrow().get(name).cloned();
        if let Some(watch) = watch {
            tracing::trace!(view = %self.id, cell = name, "running watch");
            watch(self, name);
        }
    }

    /// Names of the cells read while this view's elements rendered. Only
    /// collected in full-update mode.
    #[must_use]
    pub fn props_used_for_render(&self) -> Vec<String> {
        self.props_used_for_render.borrow().iter().cloned().collect()
    }

    /// Dirty element ids, ascending.
    #[must_use]
    pub fn dirty_elements(&self) -> Vec<ElementId> {
        self.dirty.borrow().iter().copied().collect()
    }

    #[must_use]
    pub fn has_dirty_elements(&self) -> bool {
        !self.dirty.borrow().is_empty()
    }

    /// Flag that the host should schedule a flush of this view.
    pub fn mark_need_update(&self) {
        tracing::trace!(view = %self.id, "needs update");
        self.need_update.set(true);
    }

    #[must_use]
    pub fn need_update(&self) -> bool {
        self.need_update.get()
    }

    /// Make this view the arena's active instance until the guard drops.
    pub fn sync_instance_id(&self) -> InstanceGuard {
        InstanceGuard::enter(self.arena.upgrade(), self.id)
    }

    /// Re-render dirty elements to a fixed point. Returns the passes run.
    pub fn update_dirty_elements(&self) -> usize {
        let span = tracing::debug_span!(
            "flush",
            view = %self.id,
            name = %self.name,
            dirty = self.dirty.borrow().len()
        );
        let _guard = span.enter();

        let max_passes = self.ctx.config().max_flush_passes;
        let mut passes = 0;
        loop {
            self.purge_deleted_element_ids();
            let batch = self.dirty_elements();
            if batch.is_empty() {
                break;
            }
            if passes == max_passes {
                tracing::error!(
                    passes,
                    remaining = batch.len(),
                    "flush pass limit reached, elements left dirty"
                );
                break;
            }
            passes += 1;
            for element in batch {
                if self.ctx.tracker().is_deleted(element) || !self.has_element(element) {
                    tracing::trace!(element = %element, "skipping removed element");
                } else {
                    self.update_element(element);
                }
                self.dirty.borrow_mut().remove(&element);
            }
        }
        if self.dirty.borrow().is_empty() {
            self.need_update.set(false);
        }
        passes
    }

    /// Re-run every update function, optionally in all descendants too.
    pub fn force_complete_rerender(&self, deep: bool) {
        tracing::debug!(view = %self.id, deep, "force complete rerender");
        self.purge_deleted_element_ids();
        for element in self.element_ids() {
            self.update_element(element);
        }
        if deep {
            for child in self.child_views() {
                child.force_complete_rerender(true);
            }
        }
    }

    /// Re-run one update function and clear its dirty flag.
    pub fn force_rerender_node(&self, element: ElementId) {
        self.purge_deleted_element_ids();
        self.update_element(element);
        self.dirty.borrow_mut().remove(&element);
    }

    // -----------------------------------------------------------------------
    // Element deletion
    // -----------------------------------------------------------------------

    /// Host notification: `element` left the rendered tree.
    pub fn delete_element(&self, element: ElementId) {
        self.ctx.tracker().element_deleted(element);
    }

    /// Drop bookkeeping for deleted elements this view owns. Returns them.
    pub fn purge_deleted_element_ids(&self) -> Vec<ElementId> {
        let deleted = self.ctx.tracker().deleted_element_ids();
        if deleted.is_empty() {
            return Vec::new();
        }
        let mut removed = Vec::new();
        for element in deleted {
            self.purge_element(element, &mut removed);
        }
        removed.sort_unstable();
        if !removed.is_empty() {
            tracing::debug!(view = %self.id, removed = removed.len(), "purged deleted elements");
            self.ctx.tracker().element_ids_purged(&removed);
        }
        removed
    }

    /// Purge `element` and, recursively, its child elements. Pushes every
    /// purged id onto `removed`.
    fn purge_element(&self, element: ElementId, removed: &mut Vec<ElementId>) -> bool {
        if self.update_funcs.borrow_mut().remove(&element).is_none() {
            return false;
        }
        let edges = self.element_reads.borrow_mut().remove(&element);
        for edge in edges.unwrap_or_default() {
            if let Some(cell) = edge.handle.upgrade() {
                cell.purge_dependency_on_element(element);
            }
        }
        let vars: Vec<Rc<dyn TrackedProperty>> = self.state_vars.borrow().clone();
        for var in vars {
            var.purge_dependency_on_element(element);
        }
        self.dirty.borrow_mut().remove(&element);
        self.branches.borrow_mut().remove(&element);
        self.for_each.borrow_mut().remove(&element);
        let parent = self.element_parent.borrow_mut().remove(&element);
        if let Some(parent) = parent {
            if let Some(siblings) = self.element_children.borrow_mut().get_mut(&parent) {
                siblings.retain(|sibling| *sibling != element);
            }
        }
        removed.push(element);

        let children = self.element_children.borrow_mut().remove(&element);
        for child in children.unwrap_or_default() {
            self.element_parent.borrow_mut().remove(&child);
            self.purge_element(child, removed);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    /// Render branch `branch` of the conditional at `element`.
    ///
    /// Does nothing if `branch` is already shown. Otherwise deletes the
    /// elements created by the previous branch, runs `render`, and records
    /// the elements it creates. Returns whether `render` ran.
    pub fn if_else_branch(
        &self,
        element: ElementId,
        branch: u32,
        render: impl FnOnce(&View),
    ) -> bool {
        let current = self.branches.borrow().get(&element).map(|shown| shown.id);
        if current == Some(branch) {
            tracing::trace!(view = %self.id, element = %element, branch, "branch unchanged");
            return false;
        }
        let previous = self.branches.borrow_mut().remove(&element);
        if let Some(previous) = previous {
            tracing::debug!(
                view = %self.id,
                element = %element,
                from = previous.id,
                to = branch,
                removed = previous.children.len(),
                "switching branch"
            );
            for child in previous.children {
                self.ctx.tracker().element_deleted(child);
            }
            self.purge_deleted_element_ids();
        }
        let children = self.collect_created(|| render(self));
        self.branches
            .borrow_mut()
            .insert(element, Branch { id: branch, children });
        true
    }

    /// The branch currently shown at `element`.
    #[must_use]
    pub fn branch_of(&self, element: ElementId) -> Option<u32> {
        self.branches.borrow().get(&element).map(|shown| shown.id)
    }

    // -----------------------------------------------------------------------
    // ForEach
    // -----------------------------------------------------------------------

    /// Reconcile the items of the list rendered at `element`.
    ///
    /// Called from the list element's update function. Items are matched by
    /// key against the previous call for the same `element`:
    ///
    /// - `item_gen(view, item, index)` runs only for items with a new key and
    ///   creates that item's elements on this view;
    /// - items whose key survived keep their elements, which re-render
    ///   through their own cell dependencies;
    /// - elements of items whose key disappeared are deleted and purged.
    ///
    /// Nodes are never recycled here: an item's elements stay bound to the
    /// item that created them.
    pub fn for_each_update<T>(
        &self,
        element: ElementId,
        items: &[T],
        item_gen: impl FnMut(&View, &T, usize),
        keys: &KeyGenerator<T>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let list = self.for_each.borrow_mut().remove(&element);
        let mut list = list.unwrap_or_default();
        let mut factory = ItemElements {
            view: self,
            item_gen,
        };
        let result = list.reconcile(items, keys, &mut factory);
        self.for_each.borrow_mut().insert(element, list);
        let report = result?;
        if report.removed > 0 {
            self.purge_deleted_element_ids();
        }
        tracing::debug!(
            view = %self.id,
            element = %element,
            created = report.created.len(),
            reused = report.reused,
            removed = report.removed,
            "for_each updated"
        );
        Ok(report)
    }

    /// Keys and item elements of the list at `element`, in display order.
    #[must_use]
    pub fn for_each_items(&self, element: ElementId) -> Vec<(String, Vec<ElementId>)> {
        self.for_each
            .borrow()
            .get(&element)
            .map(|list| {
                list.children()
                    .iter()
                    .map(|child| (child.key.clone(), child.node.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Watches
    // -----------------------------------------------------------------------

    /// Call `callback` whenever the cell named `name` changes.
    pub fn declare_watch(
        &self,
        name: impl Into<String>,
        callback: impl Fn(&View, &str) + 'static,
    ) {
        self.watches.borrow_mut().insert(name.into(), Rc::new(callback));
    }

    // -----------------------------------------------------------------------
    // State variables
    // -----------------------------------------------------------------------

    /// Tie `var` to this view: it is torn down with the view and its
    /// dependency edges are purged with the view's elements.
    pub fn register_state_var<P: TrackedProperty + 'static>(&self, var: &Rc<P>) {
        let var: Rc<dyn TrackedProperty> = Rc::clone(var) as Rc<dyn TrackedProperty>;
        self.state_vars.borrow_mut().push(var);
    }

    #[must_use]
    pub fn state_var_count(&self) -> usize {
        self.state_vars.borrow().len()
    }

    /// A state cell owned by this view.
    pub fn create_state<V: CellValue>(&self, value: V, name: &str) -> Rc<ObservedProperty<V>> {
        let cell = ObservedProperty::new(&self.ctx, value, Some(self.id), name);
        self.register_state_var(&cell);
        cell
    }

    /// A two-way link to a parent's cell.
    pub fn create_link<V: CellValue>(&self, source: SourceRef<V>, name: &str) -> Rc<Link<V>> {
        let link = Link::new(source, Some(self.id), name);
        self.register_state_var(&link);
        link
    }

    /// A one-way prop of a parent's cell. Object values are copied.
    pub fn create_prop<V: CellValue>(&self, source: SourceRef<V>, name: &str) -> Rc<Prop<V>> {
        let prop = Prop::new(source, Some(self.id), name);
        self.register_state_var(&prop);
        prop
    }

    /// A one-way prop initialized from a plain value.
    pub fn create_prop_value<V: CellValue>(&self, value: V, name: &str) -> Rc<Prop<V>> {
        let prop = Prop::from_value(&self.ctx, value, Some(self.id), name);
        self.register_state_var(&prop);
        prop
    }

    /// A link bound directly to an observed object, e.g. one list item of
    /// the parent's state.
    pub fn create_object_link<T: Clone + 'static>(
        &self,
        value: Observed<T>,
        name: &str,
    ) -> Rc<NestedLink<T>> {
        let link = NestedLink::new(&self.ctx, value, Some(self.id), name);
        self.register_state_var(&link);
        link
    }

    // -----------------------------------------------------------------------
    // Provide / consume
    // -----------------------------------------------------------------------

    /// Provide `source` to descendants created from now on under `name`.
    pub fn add_provided_var<V: CellValue>(
        &self,
        name: &str,
        source: SourceRef<V>,
    ) -> Result<(), StateError> {
        let inserted = self.provided.borrow_mut().insert(name, self.id, source);
        inserted.map_err(|provider| {
            tracing::error!(view = %self.id, name, provider = %provider, "duplicate provide");
            StateError::DuplicateProvide {
                view: self.name.clone(),
                name: name.to_owned(),
            }
        })
    }

    /// Bind to the nearest ancestor's provided `name` with a two-way link.
    pub fn initialize_consume<V: CellValue>(
        &self,
        name: &str,
        var_name: &str,
    ) -> Result<Rc<Link<V>>, StateError> {
        let found = self.provided.borrow().get::<V>(name);
        match found {
            Ok(Some(source)) => Ok(self.create_link(source, var_name)),
            Ok(None) => Err(StateError::MissingProvide {
                view: self.name.clone(),
                name: name.to_owned(),
            }),
            Err(stored) => {
                tracing::error!(view = %self.id, name, stored, "provided variable type mismatch");
                Err(StateError::ProvideTypeMismatch {
                    name: name.to_owned(),
                    expected: std::any::type_name::<V>(),
                })
            }
        }
    }

    /// Names visible to this view's consumers, sorted.
    #[must_use]
    pub fn provided_names(&self) -> Vec<String> {
        self.provided.borrow().names()
    }

    #[must_use]
    pub fn provides(&self, name: &str) -> bool {
        self.provided.borrow().contains(name)
    }

    // -----------------------------------------------------------------------
    // Stores
    // -----------------------------------------------------------------------

    /// The local store: set explicitly, inherited from the parent, or
    /// created at the root on first use.
    pub fn local_storage(&self) -> Rc<Storage> {
        if let Some(storage) = self.local_storage.borrow().as_ref() {
            return Rc::clone(storage);
        }
        let storage = match self.parent_view() {
            Some(parent) => parent.local_storage(),
            None => {
                tracing::debug!(view = %self.id, "creating local storage");
                Rc::new(Storage::new(&self.ctx))
            }
        };
        *self.local_storage.borrow_mut() = Some(Rc::clone(&storage));
        storage
    }

    /// Attach a host-supplied local store. Returns `false` (and replaces
    /// the store anyway) if one was already attached.
    pub fn set_local_storage(&self, storage: Rc<Storage>) -> bool {
        let previous = self.local_storage.borrow_mut().replace(storage);
        if previous.is_some() {
            tracing::error!(view = %self.id, "local storage set twice");
            return false;
        }
        true
    }

    /// Two-way binding to app store `key`, created from `default` if
    /// missing.
    pub fn create_storage_link<V: CellValue>(
        &self,
        key: &str,
        default: V,
        var_name: &str,
    ) -> Result<Rc<Link<V>>, StateError> {
        self.link_to_store(&self.ctx.app_storage(), key, default, var_name)
    }

    /// One-way binding to app store `key`.
    pub fn create_storage_prop<V: CellValue>(
        &self,
        key: &str,
        default: V,
        var_name: &str,
    ) -> Result<Rc<Prop<V>>, StateError> {
        self.prop_of_store(&self.ctx.app_storage(), key, default, var_name)
    }

    /// Two-way binding to local store `key`.
    pub fn create_local_storage_link<V: CellValue>(
        &self,
        key: &str,
        default: V,
        var_name: &str,
    ) -> Result<Rc<Link<V>>, StateError> {
        self.link_to_store(&self.local_storage(), key, default, var_name)
    }

    /// One-way binding to local store `key`.
    pub fn create_local_storage_prop<V: CellValue>(
        &self,
        key: &str,
        default: V,
        var_name: &str,
    ) -> Result<Rc<Prop<V>>, StateError> {
        self.prop_of_store(&self.local_storage(), key, default, var_name)
    }

    fn link_to_store<V: CellValue>(
        &self,
        storage: &Storage,
        key: &str,
        default: V,
        var_name: &str,
    ) -> Result<Rc<Link<V>>, StateError> {
        let link = storage.create_sync(key, Some(default), |cell| {
            cell.create_link(Some(self.id), var_name)
        })?;
        self.register_state_var(&link);
        Ok(link)
    }

    fn prop_of_store<V: CellValue>(
        &self,
        storage: &Storage,
        key: &str,
        default: V,
        var_name: &str,
    ) -> Result<Rc<Prop<V>>, StateError> {
        if V::IS_OBJECT {
            return Err(StateError::ObjectPropUnsupported {
                name: key.to_owned(),
            });
        }
        let prop = storage.create_sync(key, Some(default), |cell| {
            cell.create_prop(Some(self.id), var_name)
        })??;
        self.register_state_var(&prop);
        Ok(prop)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Delete this view and its descendants.
    ///
    /// Purges every element, tears down the registered state variables,
    /// leaves every cell it subscribed to, and detaches from parent and
    /// arena.
    pub fn about_to_be_deleted(&self) {
        if self.deleted.replace(true) {
            return;
        }
        let span = tracing::debug_span!("view_teardown", view = %self.id, name = %self.name);
        let _guard = span.enter();

        for child in self.child_views() {
            child.about_to_be_deleted();
        }

        let elements = self.element_ids();
        let mut removed = Vec::with_capacity(elements.len());
        for element in &elements {
            self.purge_element(*element, &mut removed);
        }
        self.ctx.tracker().element_ids_purged(&removed);

        let vars = std::mem::take(&mut *self.state_vars.borrow_mut());
        for var in vars {
            var.about_to_be_deleted();
        }
        let subscribed = std::mem::take(&mut *self.subscribed.borrow_mut());
        for handle in subscribed.into_values() {
            if let Some(cell) = handle.upgrade() {
                cell.unlink_subscriber(self.id);
            }
        }

        self.watches.borrow_mut().clear();
        self.props_used_for_render.borrow_mut().clear();
        self.provided.borrow_mut().clear();
        self.branches.borrow_mut().clear();
        self.for_each.borrow_mut().clear();
        self.element_children.borrow_mut().clear();
        self.element_parent.borrow_mut().clear();
        self.element_reads.borrow_mut().clear();
        self.dirty.borrow_mut().clear();

        let arena = self.arena();
        if let Some(parent) = self.parent.get() {
            if let Some(parent) = arena.as_ref().and_then(|arena| arena.get(parent)) {
                parent.remove_child(self.id);
            }
        }
        if let Some(arena) = arena {
            arena.remove(self.id);
        }
        self.ctx.registry().delete(self.id);
        tracing::debug!(elements = elements.len(), "view deleted");
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

/// Creates list items as elements of a view.
struct ItemElements<'v, G> {
    view: &'v View,
    item_gen: G,
}

impl<T, G: FnMut(&View, &T, usize)> ChildFactory<T> for ItemElements<'_, G> {
    type Node = Vec<ElementId>;

    fn create(&mut self, item: &T, index: usize) -> Vec<ElementId> {
        let view = self.view;
        let item_gen = &mut self.item_gen;
        view.collect_created(|| item_gen(view, item, index))
    }

    fn update(&mut self, _node: &mut Vec<ElementId>, _item: &T, _index: usize) {}

    fn unmount(&mut self, node: Vec<ElementId>) {
        for element in node {
            self.view.delete_element(element);
        }
    }
}

impl Subscriber for View {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn roles(&self) -> Roles {
        if self.ctx.config().partial_update {
            Roles::ELEMENT_DEPENDENCY_CHANGED
        } else {
            Roles::PROPERTY_READ | Roles::VALUE_CHANGED
        }
    }

    fn notify(&self, notification: &Notification<'_>) {
        match notification {
            Notification::ElementDependencyChanged { name, elements } => {
                self.view_property_has_changed(name, elements);
            }
            Notification::PropertyRead { name } if self.is_rendering() => {
                self.props_used_for_render.borrow_mut().insert((*name).to_owned());
            }
            Notification::ValueChanged { name } => self.property_has_changed(name),
            _ => {}
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.ctx.registry().forget(self.id);
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent.get())
            .field("children", &*self.children.borrow())
            .field("elements", &self.element_ids())
            .field("dirty", &*self.dirty.borrow())
            .field("provided", &*self.provided.borrow())
            .finish_non_exhaustive()
    }
}
