#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::cell::{AbstractProperty, CellCore, SourceRef, TrackedProperty};
use crate::context::StateContext;
use crate::id::{ElementId, SubscriberId};
use crate::subscriber::{Notification, NotifyToken, Roles, Subscriber};
use crate::value::CellValue;

/// Two-way synchronized cell.
///
/// Object values are not owned by the link itself: in-place mutation reaches
/// the source (their owner), and the source's peer notification reaches the
/// link.
///
/// After teardown the link keeps its last source for reads but no longer
/// writes to it or hears from it.
pub struct Link<V: CellValue> {
    core: CellCore,
    source: RefCell<SourceRef<V>>,
    linked: Cell<bool>,
    notifying: Cell<bool>,
    this: Weak<Self>,
}

impl<V: CellValue> Link<V> {
    /// Bind a new link to `source` and subscribe to it.
    pub fn new(
        source: SourceRef<V>,
        owner: Option<SubscriberId>,
        name: impl Into<String>,
    ) -> Rc<Self> {
        let ctx = source.context().clone();
        let link = Rc::new_cyclic(|this| Self {
            core: CellCore::new(&ctx, name),
            source: RefCell::new(Rc::clone(&source)),
            linked: Cell::new(true),
            notifying: Cell::new(false),
            this: this.clone(),
        });
        ctx.registry().add(&link);
        if let Some(owner) = owner {
            link.core.subscribe(owner);
        }
        source.subscribe_me(link.core.id());
        link
    }

    /// Replace the source. The old source is unlinked; subscribers are
    /// told the value may have changed.
    pub fn relink(&self, source: SourceRef<V>) {
        source.subscribe_me(self.core.id());
        let previous = self.source.replace(source);
        if self.linked.replace(true) {
            previous.unlink_subscriber(self.core.id());
        }
        self.core.notify_changed();
    }

    /// This link as a source for further links or props.
    #[must_use]
    pub fn as_source(self: &Rc<Self>) -> SourceRef<V> {
        Rc::clone(self) as SourceRef<V>
    }

    /// The current source.
    #[must_use]
    pub fn source(&self) -> SourceRef<V> {
        Rc::clone(&self.source.borrow())
    }

    /// Whether the link still follows its source.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.linked.get()
    }

    fn source_id(&self) -> SubscriberId {
        self.source.borrow().id()
    }

    fn tracked_handle(&self) -> Weak<dyn TrackedProperty> {
        self.this.clone() as Weak<dyn TrackedProperty>
    }

    fn ctx(&self) -> &StateContext {
        self.core.ctx()
    }
}

impl<V: CellValue> Subscriber for Link<V> {
    fn id(&self) -> SubscriberId {
        self.core.id()
    }

    fn roles(&self) -> Roles {
        Roles::PEER_CHANGED
    }

    fn notify(&self, notification: &Notification<'_>) {
        if let Notification::PeerChanged { source } = notification {
            if self.notifying.get() {
                tracing::trace!(link = %self.core.id(), "echo from own write suppressed");
                return;
            }
            if !self.linked.get() || self.source_id() != *source {
                tracing::debug!(
                    link = %self.core.id(),
                    from = %source,
                    "change from a non-source peer ignored"
                );
                return;
            }
            self.core.notify_changed();
        }
    }
}

impl<V: CellValue> TrackedProperty for Link<V> {
    fn info(&self) -> &str {
        self.core.name()
    }

    fn context(&self) -> &StateContext {
        self.ctx()
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
        if self.linked.replace(false) {
            self.source().unlink_subscriber(self.core.id());
        }
        self.core.unregister();
    }
}

impl<V: CellValue> AbstractProperty for Link<V> {
    type Value = V;

    fn get(&self) -> V {
        self.core.record_read(self.tracked_handle());
        self.get_unmonitored()
    }

    fn get_unmonitored(&self) -> V {
        self.source().get_unmonitored()
    }

    fn set(&self, value: V) {
        if !self.linked.get() {
            tracing::warn!(
                link = %self.core.id(),
                name = self.core.name(),
                "set on a torn-down link ignored"
            );
            return;
        }
        let source = self.source();
        if source.get_unmonitored() == value {
            return;
        }
        let _token = NotifyToken::hold(&self.notifying);
        source.set(value);
        self.core.notify_changed();
    }
}

impl<V: CellValue> Drop for Link<V> {
    fn drop(&mut self) {
        if self.linked.get() {
            self.source.get_mut().unlink_subscriber(self.core.id());
        }
    }
}

impl<V: CellValue + fmt::Debug> fmt::Debug for Link<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("core", &self.core)
            .field("source", &self.source_id())
            .field("linked", &self.linked.get())
            .finish()
    }
}
