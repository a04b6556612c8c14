#![forbid(unsafe_code)]

//! Property cells.
//!
//! A property cell holds one value and a set of subscriber ids. Reads record
//! a dependency on the element currently rendering; writes are
//! equality-gated and, on change, synchronously notify every subscriber.
//!
//! - [`TrackedProperty`]: the type-erased lifecycle surface every cell has
//!   (subscribers, dependent elements, teardown).
//! - [`AbstractProperty`]: the typed `get`/`set` surface. Links and props
//!   hold their source as a [`SourceRef`].
//! - [`ObservedProperty`]: the plain state cell; also the entry type of
//!   [`Storage`](crate::Storage).
//!
//! # Change fan-out
//!
//! When a cell changes, each subscriber receives, by declared role:
//!
//! 1. `ElementDependencyChanged` with the cell's dependent elements if it
//!    declares that role, otherwise `PeerChanged` naming the cell if it
//!    declares that;
//! 2. additionally `ValueChanged` if it declares that.
//!
//! Ids that no longer resolve are logged and skipped.
//!
//! # Invariants
//!
//! 1. `set(v)` with `v == current` is a no-op: nothing is stored, nobody is
//!    notified.
//! 2. The subscriber set is snapshotted before dispatch; subscribers may
//!    subscribe or unlink from inside a notification.
//! 3. A cell holding an object value is one of that object's owners, and is
//!    owner of at most one object at a time.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::context::StateContext;
use crate::error::StateError;
use crate::id::{ElementId, SubscriberId};
use crate::subscriber::{Notification, Roles, Subscriber, dispatch};
use crate::synced::{Link, Prop};
use crate::value::CellValue;

/// Lifecycle surface shared by every cell, independent of its value type.
pub trait TrackedProperty: Subscriber {
    /// Debug name.
    fn info(&self) -> &str;

    fn context(&self) -> &StateContext;

    fn subscribe_me(&self, subscriber: SubscriberId);

    fn unlink_subscriber(&self, subscriber: SubscriberId);

    fn number_of_subscribers(&self) -> usize;

    /// Elements that read this cell while rendering, ascending.
    fn dependent_elements(&self) -> Vec<ElementId>;

    /// Drop the edge to a deleted element.
    fn purge_dependency_on_element(&self, element: ElementId);

    /// Unlink from sources, release owned objects, unregister.
    fn about_to_be_deleted(&self);
}

/// Typed value access.
pub trait AbstractProperty: TrackedProperty {
    type Value: CellValue;

    /// Read and record the dependency.
    fn get(&self) -> Self::Value;

    /// Read without recording anything.
    fn get_unmonitored(&self) -> Self::Value;

    fn set(&self, value: Self::Value);
}

/// Shared handle to any cell with value type `V`.
pub type SourceRef<V> = Rc<dyn AbstractProperty<Value = V>>;

// ---------------------------------------------------------------------------
// CellCore
// ---------------------------------------------------------------------------

/// Identity, subscribers and dependency bookkeeping common to all cells.
pub(crate) struct CellCore {
    ctx: StateContext,
    id: SubscriberId,
    name: String,
    subscribers: RefCell<AHashSet<SubscriberId>>,
    dependents: RefCell<BTreeSet<ElementId>>,
}

impl CellCore {
    pub(crate) fn new(ctx: &StateContext, name: impl Into<String>) -> Self {
        Self {
            ctx: ctx.clone(),
            id: ctx.registry().make_id(),
            name: name.into(),
            subscribers: RefCell::new(AHashSet::new()),
            dependents: RefCell::new(BTreeSet::new()),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ctx(&self) -> &StateContext {
        &self.ctx
    }

    pub(crate) fn subscribe(&self, subscriber: SubscriberId) -> bool {
        self.subscribers.borrow_mut().insert(subscriber)
    }

    pub(crate) fn unlink(&self, subscriber: SubscriberId) -> bool {
        self.subscribers.borrow_mut().remove(&subscriber)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub(crate) fn dependents(&self) -> Vec<ElementId> {
        self.dependents.borrow().iter().copied().collect()
    }

    pub(crate) fn purge_dependent(&self, element: ElementId) {
        self.dependents.borrow_mut().remove(&element);
    }

    fn snapshot(&self) -> SmallVec<[SubscriberId; 4]> {
        let mut ids: SmallVec<[SubscriberId; 4]> =
            self.subscribers.borrow().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Attribute a read to the rendering element and tell read listeners.
    ///
    /// The render scope always logs the read so the owning view learns which
    /// cells it used; the cell keeps the element as a dependent only in
    /// partial-update mode.
    pub(crate) fn record_read(&self, handle: Weak<dyn TrackedProperty>) {
        let element = self.ctx.tracker().record_read(self.id, handle);
        if let Some(element) = element.filter(|_| self.ctx.config().partial_update) {
            self.dependents.borrow_mut().insert(element);
        }
        let name = self.name.as_str();
        self.broadcast(|roles| {
            roles
                .contains(Roles::PROPERTY_READ)
                .then_some(Notification::PropertyRead { name })
        });
    }

    /// Fan a change out to every subscriber.
    pub(crate) fn notify_changed(&self) {
        let elements = self.dependents();
        let name = self.name.as_str();
        let source = self.id;
        tracing::trace!(cell = %source, name, "cell changed");
        self.broadcast(|roles| {
            if roles.contains(Roles::ELEMENT_DEPENDENCY_CHANGED) {
                Some(Notification::ElementDependencyChanged {
                    name,
                    elements: &elements,
                })
            } else if roles.contains(Roles::PEER_CHANGED) {
                Some(Notification::PeerChanged { source })
            } else {
                None
            }
        });
        self.broadcast(|roles| {
            roles
                .contains(Roles::VALUE_CHANGED)
                .then_some(Notification::ValueChanged { name })
        });
    }

    fn broadcast<'n>(&self, mut event_for: impl FnMut(Roles) -> Option<Notification<'n>>) {
        let trace = self.ctx.config().trace_notifications;
        for id in self.snapshot() {
            let Some(subscriber) = self.ctx.registry().find(id) else {
                tracing::warn!(
                    cell = %self.id,
                    name = %self.name,
                    subscriber = %id,
                    "unknown subscriber id"
                );
                continue;
            };
            if let Some(event) = event_for(subscriber.roles()) {
                if trace {
                    tracing::trace!(from = %self.id, to = %id, role = ?event.role(), "notify");
                }
                dispatch(subscriber.as_ref(), &event);
            }
        }
    }

    pub(crate) fn unregister(&self) {
        self.ctx.registry().delete(self.id);
    }
}

impl Drop for CellCore {
    fn drop(&mut self) {
        self.ctx.registry().forget(self.id);
    }
}

impl fmt::Debug for CellCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("subscribers", &self.snapshot())
            .field("dependents", &*self.dependents.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ObservedProperty
// ---------------------------------------------------------------------------

/// A state cell: owns its value.
pub struct ObservedProperty<V: CellValue> {
    core: CellCore,
    value: RefCell<V>,
    this: Weak<Self>,
}

impl<V: CellValue> ObservedProperty<V> {
    /// Create and register a cell. `owner`, if given, is subscribed.
    pub fn new(
        ctx: &StateContext,
        value: V,
        owner: Option<SubscriberId>,
        name: impl Into<String>,
    ) -> Rc<Self> {
        let cell = Rc::new_cyclic(|this| Self {
            core: CellCore::new(ctx, name),
            value: RefCell::new(value),
            this: this.clone(),
        });
        ctx.registry().add(&cell);
        if let Some(owner) = owner {
            cell.core.subscribe(owner);
        }
        cell.value.borrow().attach_owner(cell.core.id(), cell.subscriber_handle());
        cell
    }

    /// This cell as a link/prop source.
    #[must_use]
    pub fn as_source(self: &Rc<Self>) -> SourceRef<V> {
        Rc::clone(self) as SourceRef<V>
    }

    /// A two-way link to this cell.
    pub fn create_link(
        self: &Rc<Self>,
        owner: Option<SubscriberId>,
        name: impl Into<String>,
    ) -> Rc<Link<V>> {
        Link::new(self.as_source(), owner, name)
    }

    /// A one-way prop of this cell. Object-typed cells only support links.
    pub fn create_prop(
        self: &Rc<Self>,
        owner: Option<SubscriberId>,
        name: impl Into<String>,
    ) -> Result<Rc<Prop<V>>, StateError> {
        if V::IS_OBJECT {
            return Err(StateError::ObjectPropUnsupported {
                name: self.core.name().to_owned(),
            });
        }
        Ok(Prop::new(self.as_source(), owner, name))
    }

    fn subscriber_handle(&self) -> Weak<dyn Subscriber> {
        self.this.clone() as Weak<dyn Subscriber>
    }

    fn tracked_handle(&self) -> Weak<dyn TrackedProperty> {
        self.this.clone() as Weak<dyn TrackedProperty>
    }
}

impl<V: CellValue> Subscriber for ObservedProperty<V> {
    fn id(&self) -> SubscriberId {
        self.core.id()
    }

    fn roles(&self) -> Roles {
        Roles::PEER_CHANGED | Roles::OBJECT_PROPERTY_CHANGED | Roles::OBJECT_PROPERTY_READ
    }

    fn notify(&self, notification: &Notification<'_>) {
        match notification {
            Notification::PeerChanged { .. } | Notification::ObjectPropertyChanged { .. } => {
                self.core.notify_changed();
            }
            Notification::ObjectPropertyRead { .. } => {
                self.core.record_read(self.tracked_handle());
            }
            _ => {}
        }
    }
}

impl<V: CellValue> TrackedProperty for ObservedProperty<V> {
    fn info(&self) -> &str {
        self.core.name()
    }

    fn context(&self) -> &StateContext {
        self.core.ctx()
    }

    fn subscribe_me(&self, subscriber: SubscriberId) {
        self.core.subscribe(subscriber);
    }

    fn unlink_subscriber(&self, subscriber: SubscriberId) {
        self.core.unlink(subscriber);
    }

    fn number_of_subscribers(&self) -> usize {
        self.core.subscriber_count()
    }

    fn dependent_elements(&self) -> Vec<ElementId> {
        self.core.dependents()
    }

    fn purge_dependency_on_element(&self, element: ElementId) {
        self.core.purge_dependent(element);
    }

    fn about_to_be_deleted(&self) {
        self.value.borrow().detach_owner(self.core.id());
        self.core.unregister();
    }
}

impl<V: CellValue> AbstractProperty for ObservedProperty<V> {
    type Value = V;

    fn get(&self) -> V {
        self.core.record_read(self.tracked_handle());
        self.get_unmonitored()
    }

    fn get_unmonitored(&self) -> V {
        self.value.borrow().clone()
    }

    fn set(&self, value: V) {
        if *self.value.borrow() == value {
            tracing::trace!(cell = %self.core.id(), name = self.core.name(), "set: unchanged");
            return;
        }
        let previous = self.value.replace(value);
        previous.detach_owner(self.core.id());
        self.value
            .borrow()
            .attach_owner(self.core.id(), self.subscriber_handle());
        self.core.notify_changed();
    }
}

impl<V: CellValue + fmt::Debug> fmt::Debug for ObservedProperty<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedProperty")
            .field("core", &self.core)
            .field("value", &*self.value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observed::Observed;
    use crate::subscriber::FnSubscriber;
    use std::cell::Cell;
    use tracing_test::traced_test;

    fn counter(ctx: &StateContext, roles: Roles) -> (Rc<FnSubscriber>, Rc<Cell<u32>>) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = FnSubscriber::new(ctx, roles, move |_| h.set(h.get() + 1));
        (sub, hits)
    }

    #[test]
    fn equal_set_never_notifies() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, 5, None, "count");
        let (sub, hits) = counter(&ctx, Roles::VALUE_CHANGED);
        cell.subscribe_me(sub.id());

        cell.set(5);
        assert_eq!(hits.get(), 0, "equal value must not notify");
        cell.set(6);
        assert_eq!(hits.get(), 1);
        assert_eq!(cell.get(), 6);
    }

    #[test]
    fn fan_out_follows_declared_roles() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, "a".to_string(), None, "label");
        let (peer, peer_hits) = counter(&ctx, Roles::PEER_CHANGED);
        let (both, both_hits) = counter(&ctx, Roles::PEER_CHANGED | Roles::VALUE_CHANGED);
        let (deaf, deaf_hits) = counter(&ctx, Roles::OBJECT_PROPERTY_READ);
        for id in [peer.id(), both.id(), deaf.id()] {
            cell.subscribe_me(id);
        }

        cell.set("b".to_string());
        assert_eq!(peer_hits.get(), 1);
        assert_eq!(both_hits.get(), 2);
        assert_eq!(deaf_hits.get(), 0);
    }

    #[test]
    fn element_dependency_takes_precedence_over_peer() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, 0_u8, None, "x");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let view = FnSubscriber::new(
            &ctx,
            Roles::ELEMENT_DEPENDENCY_CHANGED | Roles::PEER_CHANGED,
            move |n| s.borrow_mut().push(n.role()),
        );
        cell.subscribe_me(view.id());

        let element = ctx.tracker().allocate_element_id();
        {
            let _scope = ctx.tracker().enter(element);
            let _ = cell.get();
        }
        assert_eq!(cell.dependent_elements(), vec![element]);

        cell.set(1);
        assert_eq!(*seen.borrow(), vec![Roles::ELEMENT_DEPENDENCY_CHANGED]);
    }

    #[test]
    fn reads_outside_render_or_unmonitored_record_nothing() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, 1, None, "x");
        let _ = cell.get();
        let element = ctx.tracker().allocate_element_id();
        {
            let _scope = ctx.tracker().enter(element);
            let _ = cell.get_unmonitored();
        }
        assert!(cell.dependent_elements().is_empty());
    }

    #[test]
    fn partial_update_off_skips_dependency_recording() {
        let ctx =
            StateContext::with_config(crate::StateConfig::default().with_partial_update(false));
        let cell = ObservedProperty::new(&ctx, 1, None, "x");
        let element = ctx.tracker().allocate_element_id();
        let scope = ctx.tracker().enter(element);
        let _ = cell.get();
        let reads = scope.finish();
        assert_eq!(reads.len(), 1, "the view still learns what was read");
        assert_eq!(reads[0].cell, cell.id());
        assert!(cell.dependent_elements().is_empty());
    }

    #[test]
    fn purge_removes_one_edge() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, 1, None, "x");
        let a = ctx.tracker().allocate_element_id();
        let b = ctx.tracker().allocate_element_id();
        for element in [a, b] {
            let _scope = ctx.tracker().enter(element);
            let _ = cell.get();
        }
        cell.purge_dependency_on_element(a);
        assert_eq!(cell.dependent_elements(), vec![b]);
    }

    #[test]
    fn object_values_move_ownership_on_set() {
        let ctx = StateContext::new();
        let first = Observed::new(vec![1]);
        let cell = ObservedProperty::new(&ctx, first.clone(), None, "list");
        assert!(first.owners().contains(cell.id()));

        let (sub, hits) = counter(&ctx, Roles::VALUE_CHANGED);
        cell.subscribe_me(sub.id());

        first.push(2);
        assert_eq!(hits.get(), 1, "in-place mutation reaches the cell");

        let second = Observed::new(vec![9]);
        cell.set(second.clone());
        assert_eq!(hits.get(), 2);
        assert!(!first.owners().contains(cell.id()));
        assert!(second.owners().contains(cell.id()));

        first.push(3);
        assert_eq!(hits.get(), 2, "old wrapper no longer reaches the cell");
    }

    #[test]
    fn object_cells_refuse_props() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, Observed::new(vec![1]), None, "list");
        let err = cell.create_prop(None, "p").expect_err("object prop must fail");
        assert!(matches!(err, StateError::ObjectPropUnsupported { .. }));

        let primitive = ObservedProperty::new(&ctx, 1, None, "n");
        assert!(primitive.create_prop(None, "p").is_ok());
    }

    #[test]
    #[traced_test]
    fn unknown_subscribers_are_logged_and_skipped() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, 1, None, "x");
        cell.subscribe_me(SubscriberId::new(9_999));
        cell.set(2);
        assert!(logs_contain("unknown subscriber id"));
    }

    #[test]
    fn teardown_unregisters_and_releases_object() {
        let ctx = StateContext::new();
        let obj = Observed::new(vec![0]);
        let cell = ObservedProperty::new(&ctx, obj.clone(), None, "o");
        let id = cell.id();
        assert!(ctx.registry().has(id));
        cell.about_to_be_deleted();
        assert!(!ctx.registry().has(id));
        assert!(obj.owners().is_empty());
    }

    #[test]
    fn dropping_a_cell_unregisters_it() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, 1, None, "x");
        let id = cell.id();
        drop(cell);
        assert!(ctx.registry().find(id).is_none());
        assert_eq!(ctx.registry().purge_dead(), 0);
    }
}
