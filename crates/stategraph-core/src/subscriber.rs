#![forbid(unsafe_code)]

//! The subscriber contract.
//!
//! Every participant in change propagation implements [`Subscriber`] and
//! declares which notifications it understands through a [`Roles`] set.
//! Dispatch matches a [`Notification`]'s role against the declared set; a
//! subscriber never receives an event it did not opt into.
//!
//! # Roles
//!
//! | Role | Sent when | Typical receiver |
//! |------|-----------|------------------|
//! | `VALUE_CHANGED` | a cell stored a new value | user callbacks |
//! | `PEER_CHANGED` | a source cell changed | links and props |
//! | `OBJECT_PROPERTY_CHANGED` | a field of an observed wrapper changed | owning cells |
//! | `OBJECT_PROPERTY_READ` | a field of an observed wrapper was read | owning cells |
//! | `ELEMENT_DEPENDENCY_CHANGED` | a cell changed and has dependent elements | views |
//! | `PROPERTY_READ` | a cell was read | diagnostics |

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::context::StateContext;
use crate::id::{ElementId, SubscriberId};

bitflags! {
    /// Capability set declared by a [`Subscriber`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Roles: u8 {
        const VALUE_CHANGED = 1 << 0;
        const PEER_CHANGED = 1 << 1;
        const OBJECT_PROPERTY_CHANGED = 1 << 2;
        const OBJECT_PROPERTY_READ = 1 << 3;
        const ELEMENT_DEPENDENCY_CHANGED = 1 << 4;
        const PROPERTY_READ = 1 << 5;
    }
}

/// An event delivered to a [`Subscriber`].
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    /// The cell named `name` stored a new value.
    ValueChanged { name: &'a str },
    /// The source cell `source` changed.
    PeerChanged { source: SubscriberId },
    /// Field `field` of an owned observed wrapper was written.
    ObjectPropertyChanged { field: &'a str },
    /// Field `field` of an owned observed wrapper was read.
    ObjectPropertyRead { field: &'a str },
    /// Cell `name` changed; `elements` read it during their last render.
    ElementDependencyChanged {
        name: &'a str,
        elements: &'a [ElementId],
    },
    /// Cell `name` was read.
    PropertyRead { name: &'a str },
}

impl Notification<'_> {
    /// The role a subscriber must declare to receive this event.
    #[must_use]
    pub const fn role(&self) -> Roles {
        match self {
            Self::ValueChanged { .. } => Roles::VALUE_CHANGED,
            Self::PeerChanged { .. } => Roles::PEER_CHANGED,
            Self::ObjectPropertyChanged { .. } => Roles::OBJECT_PROPERTY_CHANGED,
            Self::ObjectPropertyRead { .. } => Roles::OBJECT_PROPERTY_READ,
            Self::ElementDependencyChanged { .. } => Roles::ELEMENT_DEPENDENCY_CHANGED,
            Self::PropertyRead { .. } => Roles::PROPERTY_READ,
        }
    }
}

/// Anything that can be registered and notified.
pub trait Subscriber {
    /// Registry identity. Must be stable for the subscriber's lifetime.
    fn id(&self) -> SubscriberId;

    /// Notifications this subscriber handles.
    fn roles(&self) -> Roles;

    /// Handle an event. Only called for events whose role is in [`roles`](Self::roles).
    fn notify(&self, notification: &Notification<'_>);
}

/// Deliver `notification` if the subscriber declared its role.
///
/// Returns `true` when delivered.
pub fn dispatch(subscriber: &dyn Subscriber, notification: &Notification<'_>) -> bool {
    if subscriber.roles().contains(notification.role()) {
        subscriber.notify(notification);
        true
    } else {
        false
    }
}

// ---------------------------------------------------------------------------
// FnSubscriber
// ---------------------------------------------------------------------------

/// A closure registered as a subscriber.
///
/// Unregisters itself from the context's registry on drop.
pub struct FnSubscriber {
    id: SubscriberId,
    roles: Roles,
    ctx: StateContext,
    callback: Box<dyn Fn(&Notification<'_>)>,
}

impl FnSubscriber {
    /// Create and register a closure subscriber.
    pub fn new(
        ctx: &StateContext,
        roles: Roles,
        callback: impl Fn(&Notification<'_>) + 'static,
    ) -> Rc<Self> {
        let subscriber = Rc::new(Self {
            id: ctx.registry().make_id(),
            roles,
            ctx: ctx.clone(),
            callback: Box::new(callback),
        });
        ctx.registry().add(&subscriber);
        subscriber
    }
}

impl Subscriber for FnSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn roles(&self) -> Roles {
        self.roles
    }

    fn notify(&self, notification: &Notification<'_>) {
        (self.callback)(notification);
    }
}

impl Drop for FnSubscriber {
    fn drop(&mut self) {
        self.ctx.registry().forget(self.id);
    }
}

impl fmt::Debug for FnSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSubscriber")
            .field("id", &self.id)
            .field("roles", &self.roles)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NotifyToken
// ---------------------------------------------------------------------------

/// Marks a notification edge as busy while alive.
///
/// The previous state is restored on drop, so nested holds on the same flag
/// unwind correctly and a panic inside the guarded region cannot leave the
/// edge stuck.
#[must_use = "the edge is released as soon as the token is dropped"]
pub struct NotifyToken<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> NotifyToken<'a> {
    /// Set `flag` for the lifetime of the returned token.
    pub fn hold(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for NotifyToken<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}
