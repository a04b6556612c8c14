#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::cell::{AbstractProperty, CellCore, ObservedProperty, SourceRef, TrackedProperty};
use crate::context::StateContext;
use crate::id::{ElementId, SubscriberId};
use crate::subscriber::{Notification, Roles, Subscriber};
use crate::value::CellValue;

/// One-way synchronized cell.
///
/// Holds a private copy of the source value ([`CellValue::shallow_copy`]),
/// refreshed whenever the source changes. For object values the copy is a
/// new wrapper owned by the prop, so in-place mutation of the copy notifies
/// the prop's subscribers and never reaches the source.
pub struct Prop<V: CellValue> {
    core: CellCore,
    source: RefCell<SourceRef<V>>,
    linked: Cell<bool>,
    owns_source: bool,
    value: RefCell<V>,
    this: Weak<Self>,
}

impl<V: CellValue> Prop<V> {
    /// Bind a new prop to `source`, copying its current value.
    pub fn new(
        source: SourceRef<V>,
        owner: Option<SubscriberId>,
        name: impl Into<String>,
    ) -> Rc<Self> {
        Self::build(source, false, owner, name)
    }

    /// A prop that is not bound to a parent cell.
    ///
    /// A private source cell holding `value` is created and owned by the
    /// prop; it is torn down with the prop.
    pub fn from_value(
        ctx: &StateContext,
        value: V,
        owner: Option<SubscriberId>,
        name: impl Into<String>,
    ) -> Rc<Self> {
        let name = name.into();
        let source = ObservedProperty::new(ctx, value, None, format!("{name}.source"));
        Self::build(source.as_source(), true, owner, name)
    }

    fn build(
        source: SourceRef<V>,
        owns_source: bool,
        owner: Option<SubscriberId>,
        name: impl Into<String>,
    ) -> Rc<Self> {
        let ctx = source.context().clone();
        let copy = source.get_unmonitored().shallow_copy();
        let prop = Rc::new_cyclic(|this| Self {
            core: CellCore::new(&ctx, name),
            source: RefCell::new(Rc::clone(&source)),
            linked: Cell::new(true),
            owns_source,
            value: RefCell::new(copy),
            this: this.clone(),
        });
        ctx.registry().add(&prop);
        if let Some(owner) = owner {
            prop.core.subscribe(owner);
        }
        source.subscribe_me(prop.core.id());
        prop.value
            .borrow()
            .attach_owner(prop.core.id(), prop.subscriber_handle());
        prop
    }

    /// This prop as a source for further links or props.
    #[must_use]
    pub fn as_source(self: &Rc<Self>) -> SourceRef<V> {
        Rc::clone(self) as SourceRef<V>
    }

    /// Write `value` to the source. The prop refreshes from the source's
    /// notification like any other upstream change.
    pub fn reset(&self, value: V) {
        if !self.linked.get() {
            tracing::warn!(prop = %self.core.id(), "reset on a torn-down prop ignored");
            return;
        }
        self.source().set(value);
    }

    #[must_use]
    pub fn source(&self) -> SourceRef<V> {
        Rc::clone(&self.source.borrow())
    }

    /// Whether the source was created by [`Prop::from_value`].
    #[must_use]
    pub fn owns_source(&self) -> bool {
        self.owns_source
    }

    fn sync_from_source(&self) {
        let copy = self.source().get_unmonitored().shallow_copy();
        self.store(copy);
        self.core.notify_changed();
    }

    fn store(&self, value: V) {
        let previous = self.value.replace(value);
        previous.detach_owner(self.core.id());
        self.value
            .borrow()
            .attach_owner(self.core.id(), self.subscriber_handle());
    }

    fn release_source(&self) {
        if !self.linked.replace(false) {
            return;
        }
        let source = self.source();
        source.unlink_subscriber(self.core.id());
        if self.owns_source && source.number_of_subscribers() == 0 {
            source.about_to_be_deleted();
        }
    }

    fn subscriber_handle(&self) -> Weak<dyn Subscriber> {
        self.this.clone() as Weak<dyn Subscriber>
    }

    fn tracked_handle(&self) -> Weak<dyn TrackedProperty> {
        self.this.clone() as Weak<dyn TrackedProperty>
    }
}

impl<V: CellValue> Subscriber for Prop<V> {
    fn id(&self) -> SubscriberId {
        self.core.id()
    }

    fn roles(&self) -> Roles {
        Roles::PEER_CHANGED | Roles::OBJECT_PROPERTY_CHANGED | Roles::OBJECT_PROPERTY_READ
    }

    fn notify(&self, notification: &Notification<'_>) {
        match notification {
            Notification::PeerChanged { source } => {
                if self.linked.get() && self.source.borrow().id() == *source {
                    self.sync_from_source();
                }
            }
            Notification::ObjectPropertyChanged { .. } => self.core.notify_changed(),
            Notification::ObjectPropertyRead { .. } => {
                self.core.record_read(self.tracked_handle());
            }
            _ => {}
        }
    }
}

impl<V: CellValue> TrackedProperty for Prop<V> {
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
        self.release_source();
        self.value.borrow().detach_owner(self.core.id());
        self.core.unregister();
    }
}

impl<V: CellValue> AbstractProperty for Prop<V> {
    type Value = V;

    fn get(&self) -> V {
        self.core.record_read(self.tracked_handle());
        self.get_unmonitored()
    }

    fn get_unmonitored(&self) -> V {
        self.value.borrow().clone()
    }

    /// Local write. The source is not touched; see [`Prop::reset`].
    fn set(&self, value: V) {
        if *self.value.borrow() == value {
            return;
        }
        self.store(value);
        self.core.notify_changed();
    }
}

impl<V: CellValue> Drop for Prop<V> {
    fn drop(&mut self) {
        self.release_source();
    }
}

impl<V: CellValue + fmt::Debug> fmt::Debug for Prop<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prop")
            .field("core", &self.core)
            .field("source", &self.source.borrow().id())
            .field("owns_source", &self.owns_source)
            .field("value", &*self.value.borrow())
            .finish()
    }
}
