#![forbid(unsafe_code)]

//! The set of cells that own an object value.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::id::SubscriberId;
use crate::subscriber::{Notification, Subscriber, dispatch};

type OwnerList = SmallVec<[(SubscriberId, Weak<dyn Subscriber>); 2]>;

/// Owning cells of a shared object.
///
/// [`Observed`](crate::Observed) uses this internally. User-defined shared
/// types can embed an `OwnerSet`, forward [`CellValue`](crate::CellValue)'s
/// `attach_owner`/`detach_owner` to it, and call
/// [`notify_changed`](Self::notify_changed) from their own mutators.
#[derive(Default)]
pub struct OwnerSet {
    owners: RefCell<OwnerList>,
}

impl OwnerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an owner. Returns `false` if it already owns this object.
    pub fn add(&self, owner: SubscriberId, handle: Weak<dyn Subscriber>) -> bool {
        let mut owners = self.owners.borrow_mut();
        if owners.iter().any(|(id, _)| *id == owner) {
            return false;
        }
        owners.push((owner, handle));
        true
    }

    /// Remove an owner. Returns `false` if it was not an owner.
    pub fn remove(&self, owner: SubscriberId) -> bool {
        let mut owners = self.owners.borrow_mut();
        let before = owners.len();
        owners.retain(|(id, _)| *id != owner);
        owners.len() != before
    }

    #[must_use]
    pub fn contains(&self, owner: SubscriberId) -> bool {
        self.owners.borrow().iter().any(|(id, _)| *id == owner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.borrow().is_empty()
    }

    /// Owner ids in attachment order.
    #[must_use]
    pub fn ids(&self) -> Vec<SubscriberId> {
        self.owners.borrow().iter().map(|(id, _)| *id).collect()
    }

    /// Tell every owner that `field` changed.
    pub fn notify_changed(&self, field: &str) {
        self.broadcast(&Notification::ObjectPropertyChanged { field });
    }

    /// Tell every owner that `field` was read.
    pub fn notify_read(&self, field: &str) {
        self.broadcast(&Notification::ObjectPropertyRead { field });
    }

    fn broadcast(&self, notification: &Notification<'_>) {
        // Resolve first so handlers may attach or detach owners.
        let live: SmallVec<[Rc<dyn Subscriber>; 2]> = {
            let mut owners = self.owners.borrow_mut();
            owners.retain(|(id, weak)| {
                let alive = weak.strong_count() > 0;
                if !alive {
                    tracing::trace!(owner = %id, "dropping dead owner");
                }
                alive
            });
            owners.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };
        for owner in live {
            dispatch(owner.as_ref(), notification);
        }
    }
}

impl fmt::Debug for OwnerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::Roles;
    use std::cell::Cell;

    struct Owner {
        id: SubscriberId,
        changed: Cell<u32>,
        read: Cell<u32>,
    }

    impl Subscriber for Owner {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn roles(&self) -> Roles {
            Roles::OBJECT_PROPERTY_CHANGED | Roles::OBJECT_PROPERTY_READ
        }

        fn notify(&self, notification: &Notification<'_>) {
            match notification {
                Notification::ObjectPropertyChanged { .. } => {
                    self.changed.set(self.changed.get() + 1);
                }
                Notification::ObjectPropertyRead { .. } => self.read.set(self.read.get() + 1),
                _ => {}
            }
        }
    }

    fn owner(id: u64) -> Rc<Owner> {
        Rc::new(Owner {
            id: SubscriberId::new(id),
            changed: Cell::new(0),
            read: Cell::new(0),
        })
    }

    #[test]
    fn add_is_idempotent_per_owner() {
        let set = OwnerSet::new();
        let a = owner(1);
        let weak: Weak<dyn Subscriber> = Rc::downgrade(&a) as Weak<dyn Subscriber>;
        assert!(set.add(a.id, weak.clone()));
        assert!(!set.add(a.id, weak));
        assert_eq!(set.len(), 1);
        assert!(set.remove(a.id));
        assert!(!set.remove(a.id));
        assert!(set.is_empty());
    }

    #[test]
    fn notifies_each_live_owner_once() {
        let set = OwnerSet::new();
        let a = owner(1);
        let b = owner(2);
        set.add(a.id, Rc::downgrade(&a) as Weak<dyn Subscriber>);
        set.add(b.id, Rc::downgrade(&b) as Weak<dyn Subscriber>);
        set.notify_changed("x");
        set.notify_read("x");
        assert_eq!((a.changed.get(), a.read.get()), (1, 1));
        assert_eq!((b.changed.get(), b.read.get()), (1, 1));

        drop(b);
        set.notify_changed("y");
        assert_eq!(a.changed.get(), 2);
        assert_eq!(set.ids(), vec![SubscriberId::new(1)]);
    }
}
