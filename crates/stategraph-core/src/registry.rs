#![forbid(unsafe_code)]

//! Id-keyed subscriber registry.
//!
//! Notification never holds direct references between cells: a cell stores
//! the ids of its subscribers and resolves them here at dispatch time.
//!
//! # Invariants
//!
//! 1. No id is ever issued twice by [`Registry::make_id`].
//! 2. Lookups are O(1).
//! 3. Entries are weak. A dropped subscriber is never kept alive by the
//!    registry; [`Registry::find`] simply stops returning it.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `add` with an id already present | returns `false`, entry unchanged |
//! | `delete` of an unknown id | warning logged, returns `false` |
//! | subscriber dropped without `delete` | `find` returns `None`; `purge_dead` reclaims the slot |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::id::{IdCounter, SubscriberId};
use crate::subscriber::Subscriber;

/// Map from [`SubscriberId`] to live subscriber, with id generation.
pub struct Registry {
    ids: IdCounter,
    entries: RefCell<AHashMap<SubscriberId, Weak<dyn Subscriber>>>,
}

impl Registry {
    /// Create an empty registry. The first issued id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: IdCounter::starting_at(1),
            entries: RefCell::new(AHashMap::new()),
        }
    }

    /// Issue a fresh, never-reused id.
    pub fn make_id(&self) -> SubscriberId {
        SubscriberId::new(self.ids.next())
    }

    /// Register `subscriber` under its own id.
    ///
    /// Returns `false` if a live subscriber already holds that id.
    pub fn add<S: Subscriber + 'static>(&self, subscriber: &Rc<S>) -> bool {
        let id = subscriber.id();
        let weak: Weak<dyn Subscriber> = Rc::downgrade(subscriber) as Weak<dyn Subscriber>;
        let mut entries = self.entries.borrow_mut();
        if entries.get(&id).is_some_and(|existing| existing.strong_count() > 0) {
            tracing::warn!(%id, "registry: id already registered");
            return false;
        }
        entries.insert(id, weak);
        true
    }

    /// Resolve an id to its subscriber.
    #[must_use]
    pub fn find(&self, id: SubscriberId) -> Option<Rc<dyn Subscriber>> {
        self.entries.borrow().get(&id).and_then(Weak::upgrade)
    }

    /// Whether `id` resolves to a live subscriber.
    #[must_use]
    pub fn has(&self, id: SubscriberId) -> bool {
        self.entries
            .borrow()
            .get(&id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Remove an entry. Logs a warning when `id` is unknown.
    pub fn delete(&self, id: SubscriberId) -> bool {
        let removed = self.entries.borrow_mut().remove(&id).is_some();
        if !removed {
            tracing::warn!(%id, "registry: delete of unknown subscriber id");
        }
        removed
    }

    /// Remove an entry without complaint. Used from `Drop` impls, where the
    /// entry may already have been deleted by an explicit teardown.
    pub fn forget(&self, id: SubscriberId) {
        // A drop can run while a registry borrow is live during teardown.
        if let Ok(mut entries) = self.entries.try_borrow_mut() {
            entries.remove(&id);
        }
    }

    /// Number of entries, including ones whose subscriber has been dropped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Ids of live subscribers, ascending.
    #[must_use]
    pub fn live_ids(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<SubscriberId> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drop entries whose subscriber no longer exists.
    ///
    /// Returns the number of stale entries found. A non-zero result means
    /// some subscriber was discarded without being torn down.
    pub fn purge_dead(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        let stale = before - entries.len();
        if stale > 0 {
            tracing::debug!(stale, "registry: purged dead subscribers");
        }
        stale
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("next_id", &self.ids.peek())
            .field("entries", &self.len())
            .finish()
    }
}
