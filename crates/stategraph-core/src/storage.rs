#![forbid(unsafe_code)]

//! Named stores.
//!
//! A [`Storage`] maps string keys to [`ObservedProperty`] cells of any
//! [`CellValue`] type. Components bind to entries through links (two-way)
//! or props (one-way). The application-wide store is
//! [`StateContext::app_storage`]; views may also share a local store.
//!
//! # Invariants
//!
//! 1. A stored value is never absent ([`CellValue::is_absent`]).
//! 2. An entry is removed only when it has zero subscribers; `clear` is
//!    all-or-nothing.
//! 3. A key holds one value type for its lifetime; typed access with another
//!    type is treated like a missing key.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `set` on a missing key | warning, returns `false` |
//! | `set`/`set_or_create` with an absent value | warning, returns `false` |
//! | typed access with the wrong type | warning, `false`/`None` |
//! | `delete` with subscribers attached | error logged, returns `false`, entry kept |
//! | `clear` with any subscribed entry | error logged, returns `false`, nothing removed |
//! | `prop` on an object-typed entry | [`StateError::ObjectPropUnsupported`] |
//! | `create_sync` on a missing key without default | [`StateError::MissingDefault`] |

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::cell::{AbstractProperty, ObservedProperty, TrackedProperty};
use crate::context::StateContext;
use crate::error::StateError;
use crate::id::SubscriberId;
use crate::synced::{Link, Prop};
use crate::value::CellValue;

/// A type-erased store entry.
pub trait StoreEntry: TrackedProperty {
    fn as_any(self: Rc<Self>) -> Rc<dyn Any>;

    /// Name of the stored value type, for diagnostics.
    fn value_type(&self) -> &'static str;
}

impl<V: CellValue> StoreEntry for ObservedProperty<V> {
    fn as_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn value_type(&self) -> &'static str {
        std::any::type_name::<V>()
    }
}

/// String-keyed map of property cells.
pub struct Storage {
    ctx: StateContext,
    entries: RefCell<AHashMap<String, Rc<dyn StoreEntry>>>,
}

impl Storage {
    #[must_use]
    pub fn new(ctx: &StateContext) -> Self {
        Self {
            ctx: ctx.clone(),
            entries: RefCell::new(AHashMap::new()),
        }
    }

    /// Create entries for `props`, skipping absent values.
    pub fn initialize_props<V: CellValue>(
        &self,
        props: impl IntoIterator<Item = (impl Into<String>, V)>,
    ) {
        for (key, value) in props {
            let key = key.into();
            if value.is_absent() {
                tracing::debug!(key, "initialize_props: skipping absent value");
                continue;
            }
            self.add_new_property(&key, value);
        }
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get<V: CellValue>(&self, key: &str) -> Option<V> {
        self.typed::<V>(key).map(|cell| cell.get())
    }

    /// Update an existing entry. Returns `false` for absent values, missing
    /// keys and type mismatches.
    pub fn set<V: CellValue>(&self, key: &str, value: V) -> bool {
        if value.is_absent() {
            tracing::warn!(key, "set: absent value rejected");
            return false;
        }
        let Some(cell) = self.typed::<V>(key) else {
            if !self.has(key) {
                tracing::warn!(key, "set: no property with this key");
            }
            return false;
        };
        cell.set(value);
        true
    }

    /// Update `key`, creating it if missing.
    pub fn set_or_create<V: CellValue>(&self, key: &str, value: V) -> bool {
        if value.is_absent() {
            tracing::warn!(key, "set_or_create: absent value rejected");
            return false;
        }
        if self.has(key) {
            return self.set(key, value);
        }
        self.add_new_property(key, value);
        true
    }

    /// A two-way link to `key`, subscribed by `owner`.
    pub fn link<V: CellValue>(
        &self,
        key: &str,
        owner: Option<SubscriberId>,
    ) -> Option<Rc<Link<V>>> {
        let Some(cell) = self.typed::<V>(key) else {
            if !self.has(key) {
                tracing::warn!(key, "link: no property with this key");
            }
            return None;
        };
        Some(cell.create_link(owner, key))
    }

    /// Create `key` with `default` if missing, then link to it.
    pub fn set_and_link<V: CellValue>(
        &self,
        key: &str,
        default: V,
        owner: Option<SubscriberId>,
    ) -> Option<Rc<Link<V>>> {
        if !self.has(key) && !self.set_or_create(key, default) {
            return None;
        }
        self.link(key, owner)
    }

    /// A one-way prop of `key`. Object-typed entries only support links.
    pub fn prop<V: CellValue>(
        &self,
        key: &str,
        owner: Option<SubscriberId>,
    ) -> Result<Option<Rc<Prop<V>>>, StateError> {
        let Some(cell) = self.typed::<V>(key) else {
            if !self.has(key) {
                tracing::warn!(key, "prop: no property with this key");
            }
            return Ok(None);
        };
        cell.create_prop(owner, key).map(Some)
    }

    /// Create `key` with `default` if missing, then prop it.
    pub fn set_and_prop<V: CellValue>(
        &self,
        key: &str,
        default: V,
        owner: Option<SubscriberId>,
    ) -> Result<Option<Rc<Prop<V>>>, StateError> {
        if V::IS_OBJECT {
            return Err(StateError::ObjectPropUnsupported {
                name: key.to_owned(),
            });
        }
        if !self.has(key) && !self.set_or_create(key, default) {
            return Ok(None);
        }
        self.prop(key, owner)
    }

    /// Remove `key` if nothing subscribes to it.
    pub fn delete(&self, key: &str) -> bool {
        let Some(entry) = self.entry(key) else {
            tracing::warn!(key, "delete: no property with this key");
            return false;
        };
        let subscribers = entry.number_of_subscribers();
        if subscribers > 0 {
            tracing::error!(
                key,
                subscribers,
                "delete: property still has subscribers, not deleted"
            );
            return false;
        }
        self.entries.borrow_mut().remove(key);
        entry.about_to_be_deleted();
        true
    }

    /// Remove every entry, but only if none has subscribers.
    pub fn clear(&self) -> bool {
        let blocked: Vec<(String, usize)> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.number_of_subscribers() > 0)
            .map(|(key, entry)| (key.clone(), entry.number_of_subscribers()))
            .collect();
        if !blocked.is_empty() {
            for (key, subscribers) in &blocked {
                tracing::error!(key = %key, subscribers, "clear: property still has subscribers");
            }
            return false;
        }
        let drained: Vec<Rc<dyn StoreEntry>> =
            self.entries.borrow_mut().drain().map(|(_, entry)| entry).collect();
        for entry in drained {
            entry.about_to_be_deleted();
        }
        true
    }

    /// Store teardown; same contract as [`clear`](Self::clear).
    pub fn about_to_be_deleted(&self) -> bool {
        self.clear()
    }

    /// Subscribe an arbitrary subscriber to `key`.
    pub fn subscribe_to_changes_of(&self, key: &str, subscriber: SubscriberId) -> bool {
        match self.entry(key) {
            Some(entry) => {
                entry.subscribe_me(subscriber);
                true
            }
            None => {
                tracing::warn!(key, "subscribe_to_changes_of: no property with this key");
                false
            }
        }
    }

    pub fn unsubscribe_from_changes_of(&self, key: &str, subscriber: SubscriberId) -> bool {
        match self.entry(key) {
            Some(entry) => {
                entry.unlink_subscriber(subscriber);
                true
            }
            None => {
                tracing::warn!(key, "unsubscribe_from_changes_of: no property with this key");
                false
            }
        }
    }

    #[must_use]
    pub fn number_of_subscribers_to(&self, key: &str) -> Option<usize> {
        self.entry(key).map(|entry| entry.number_of_subscribers())
    }

    /// Build a synced cell for `key` with `factory`, creating the entry from
    /// `default` when missing.
    pub fn create_sync<V: CellValue, P>(
        &self,
        key: &str,
        default: Option<V>,
        factory: impl FnOnce(Rc<ObservedProperty<V>>) -> P,
    ) -> Result<P, StateError> {
        if !self.has(key) {
            let Some(default) = default else {
                return Err(StateError::MissingDefault {
                    key: key.to_owned(),
                });
            };
            if !self.set_or_create(key, default) {
                return Err(StateError::MissingDefault {
                    key: key.to_owned(),
                });
            }
        }
        match self.typed::<V>(key) {
            Some(cell) => Ok(factory(cell)),
            None => Err(StateError::StoreTypeMismatch {
                key: key.to_owned(),
                expected: std::any::type_name::<V>(),
            }),
        }
    }

    /// The typed cell behind `key`.
    #[must_use]
    pub fn property<V: CellValue>(&self, key: &str) -> Option<Rc<ObservedProperty<V>>> {
        self.typed(key)
    }

    fn add_new_property<V: CellValue>(&self, key: &str, value: V) {
        let cell = ObservedProperty::new(&self.ctx, value, None, key);
        self.entries.borrow_mut().insert(key.to_owned(), cell);
    }

    fn entry(&self, key: &str) -> Option<Rc<dyn StoreEntry>> {
        self.entries.borrow().get(key).cloned()
    }

    fn typed<V: CellValue>(&self, key: &str) -> Option<Rc<ObservedProperty<V>>> {
        let entry = self.entry(key)?;
        let stored = entry.value_type();
        match entry.as_any().downcast::<ObservedProperty<V>>() {
            Ok(cell) => Some(cell),
            Err(_) => {
                tracing::warn!(
                    key,
                    stored,
                    requested = std::any::type_name::<V>(),
                    "store: value type mismatch"
                );
                None
            }
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").field("keys", &self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observed::Observed;
    use crate::subscriber::{FnSubscriber, Roles, Subscriber};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tracing_test::traced_test;

    fn store() -> (StateContext, Storage) {
        let ctx = StateContext::new();
        let storage = Storage::new(&ctx);
        (ctx, storage)
    }

    #[test]
    fn set_rejects_missing_keys_and_absent_values() {
        let (_ctx, storage) = store();
        assert!(!storage.set("missing", 1));
        assert!(storage.set_or_create("k", Some(1)));
        assert!(!storage.set("k", None::<i32>));
        assert!(!storage.set_or_create("other", None::<i32>));
        assert_eq!(storage.get::<Option<i32>>("k"), Some(Some(1)));
        assert!(!storage.has("other"));
    }

    #[test]
    #[traced_test]
    fn type_mismatch_is_a_soft_failure() {
        let (_ctx, storage) = store();
        storage.set_or_create("n", 1_i32);
        assert!(!storage.set("n", "one".to_string()));
        assert_eq!(storage.get::<String>("n"), None);
        assert!(storage.link::<u64>("n", None).is_none());
        assert!(logs_contain("store: value type mismatch"));
        assert_eq!(storage.get::<i32>("n"), Some(1));
    }

    #[test]
    fn delete_is_gated_on_subscribers() {
        let (_ctx, storage) = store();
        storage.set_or_create("k", 1);
        let link = storage.link::<i32>("k", None).expect("link");
        assert_eq!(storage.number_of_subscribers_to("k"), Some(1));
        assert!(!storage.delete("k"));
        assert!(storage.has("k"));

        link.about_to_be_deleted();
        assert_eq!(storage.number_of_subscribers_to("k"), Some(0));
        assert!(storage.delete("k"));
        assert!(!storage.has("k"));
        assert!(!storage.delete("k"));
    }

    #[test]
    fn clear_is_all_or_nothing() {
        let (_ctx, storage) = store();
        storage.set_or_create("a", 1);
        storage.set_or_create("b", 2);
        let link = storage.link::<i32>("b", None).expect("link");
        assert!(!storage.clear());
        assert_eq!(storage.keys(), vec!["a".to_string(), "b".to_string()]);

        drop(link);
        assert!(storage.clear());
        assert_eq!(storage.size(), 0);
    }

    #[test]
    fn links_and_props_share_the_entry() {
        let (_ctx, storage) = store();
        let link = storage.set_and_link("count", 1, None).expect("link");
        let prop = storage
            .set_and_prop("count", 99, None)
            .expect("primitive prop")
            .expect("existing key");
        assert_eq!(prop.get(), 1, "default ignored when the key exists");

        link.set(5);
        assert_eq!(storage.get::<i32>("count"), Some(5));
        assert_eq!(prop.get(), 5);

        prop.set(6);
        assert_eq!(storage.get::<i32>("count"), Some(5));
        prop.reset(7);
        assert_eq!(link.get(), 7);
    }

    #[test]
    fn object_entries_refuse_props() {
        let (_ctx, storage) = store();
        storage.set_or_create("list", Observed::new(vec![1]));
        let err = storage
            .prop::<Observed<Vec<i32>>>("list", None)
            .expect_err("object prop");
        assert!(matches!(err, StateError::ObjectPropUnsupported { .. }));
        assert!(storage.set_and_prop("other", Observed::new(vec![0]), None).is_err());
        assert!(storage.link::<Observed<Vec<i32>>>("list", None).is_some());
        assert!(matches!(storage.prop::<i32>("nope", None), Ok(None)));
    }

    #[test]
    fn subscribe_to_changes_of_delivers_value_changes() {
        let (ctx, storage) = store();
        storage.set_or_create("k", 1);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = FnSubscriber::new(&ctx, Roles::VALUE_CHANGED, move |_| h.set(h.get() + 1));

        assert!(storage.subscribe_to_changes_of("k", sub.id()));
        assert!(!storage.subscribe_to_changes_of("missing", sub.id()));
        storage.set("k", 2);
        assert_eq!(hits.get(), 1);

        assert!(storage.unsubscribe_from_changes_of("k", sub.id()));
        storage.set("k", 3);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn create_sync_uses_default_or_fails() {
        let (_ctx, storage) = store();
        let err = storage
            .create_sync::<i32, _>("k", None, |cell| cell.id())
            .expect_err("no default");
        assert_eq!(err, StateError::MissingDefault { key: "k".into() });

        let link = storage
            .create_sync("k", Some(4), |cell| cell.create_link(None, "k"))
            .expect("created from default");
        assert_eq!(link.get(), 4);

        let err = storage
            .create_sync::<String, _>("k", None, |cell| cell.id())
            .expect_err("type mismatch");
        assert!(matches!(err, StateError::StoreTypeMismatch { .. }));
    }

    #[test]
    fn initialize_props_skips_absent_values() {
        let (_ctx, storage) = store();
        storage.initialize_props([("a", Some(1)), ("b", None), ("c", Some(3))]);
        assert_eq!(storage.keys(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn deleted_entries_leave_the_registry() {
        let (ctx, storage) = store();
        storage.set_or_create("k", 1);
        let id = storage.property::<i32>("k").expect("cell").id();
        assert!(ctx.registry().has(id));
        storage.delete("k");
        assert!(!ctx.registry().has(id));
    }
}
