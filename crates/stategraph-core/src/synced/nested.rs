#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::cell::{AbstractProperty, CellCore, SourceRef, TrackedProperty};
use crate::context::StateContext;
use crate::id::{ElementId, SubscriberId};
use crate::observed::Observed;
use crate::subscriber::{Notification, Roles, Subscriber};
use crate::value::CellValue;

/// A cell bound directly to an observed object.
///
/// Used when a child component receives an object nested inside a parent's
/// state (`parent.items[3]`): there is no parent cell for that object, so
/// the link becomes one of the object's owners and hears its mutations
/// directly.
pub struct NestedLink<T: Clone + 'static> {
    core: CellCore,
    value: RefCell<Observed<T>>,
    this: Weak<Self>,
}

impl<T: Clone + 'static> NestedLink<T> {
    pub fn new(
        ctx: &StateContext,
        value: Observed<T>,
        owner: Option<SubscriberId>,
        name: impl Into<String>,
    ) -> Rc<Self> {
        let link = Rc::new_cyclic(|this| Self {
            core: CellCore::new(ctx, name),
            value: RefCell::new(value),
            this: this.clone(),
        });
        ctx.registry().add(&link);
        if let Some(owner) = owner {
            link.core.subscribe(owner);
        }
        link.value
            .borrow()
            .attach_owner(link.core.id(), link.subscriber_handle());
        link
    }

    #[must_use]
    pub fn as_source(self: &Rc<Self>) -> SourceRef<Observed<T>> {
        Rc::clone(self) as SourceRef<Observed<T>>
    }

    fn subscriber_handle(&self) -> Weak<dyn Subscriber> {
        self.this.clone() as Weak<dyn Subscriber>
    }

    fn tracked_handle(&self) -> Weak<dyn TrackedProperty> {
        self.this.clone() as Weak<dyn TrackedProperty>
    }
}

impl<T: Clone + 'static> Subscriber for NestedLink<T> {
    fn id(&self) -> SubscriberId {
        self.core.id()
    }

    fn roles(&self) -> Roles {
        Roles::OBJECT_PROPERTY_CHANGED | Roles::OBJECT_PROPERTY_READ
    }

    fn notify(&self, notification: &Notification<'_>) {
        match notification {
            Notification::ObjectPropertyChanged { .. } => self.core.notify_changed(),
            Notification::ObjectPropertyRead { .. } => {
                self.core.record_read(self.tracked_handle());
            }
            _ => {}
        }
    }
}

impl<T: Clone + 'static> TrackedProperty for NestedLink<T> {
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

impl<T: Clone + 'static> AbstractProperty for NestedLink<T> {
    type Value = Observed<T>;

    fn get(&self) -> Observed<T> {
        self.core.record_read(self.tracked_handle());
        self.get_unmonitored()
    }

    fn get_unmonitored(&self) -> Observed<T> {
        self.value.borrow().clone()
    }

    /// Rebind to another object, moving ownership.
    fn set(&self, value: Observed<T>) {
        if *self.value.borrow() == value {
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

impl<T: Clone + 'static> Drop for NestedLink<T> {
    fn drop(&mut self) {
        self.value.get_mut().detach_owner(self.core.id());
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for NestedLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedLink")
            .field("core", &self.core)
            .field("value", &*self.value.borrow())
            .finish()
    }
}
