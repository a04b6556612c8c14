#![forbid(unsafe_code)]

//! Observed wrappers: object values whose in-place mutation is observable.
//!
//! An [`Observed<T>`] owns a raw `T` behind a single interception point.
//! Every write goes through [`Observed::set_field`] (equality-checked) or
//! [`Observed::mutate`] (unconditional), and each call notifies every owning
//! cell exactly once with the name of the changed field. Field reads through
//! [`Observed::get_field`] notify owners so the read is attributed to the
//! element currently rendering.
//!
//! Typed surfaces sit on top of that interception point:
//!
//! - [`observed_fields!`](crate::observed_fields) generates per-field getters
//!   and setters for a struct.
//! - `Observed<Vec<T>>` has the array mutators (see [`Spliced`]).
//! - `Observed<NaiveDateTime>` has the date setters.
//!
//! # Invariants
//!
//! 1. A raw value is wrapped at most once: only [`Observed::new`] wraps, it
//!    takes the value by move, and cloning an `Observed` shares the wrapper.
//! 2. Unwrapping ([`Observed::get_raw`], [`Observed::with_raw`]) never
//!    notifies.
//! 3. Equality is identity: two wrappers are equal only if they share one
//!    allocation.
//! 4. No `RefCell` borrow of the raw value is held while owners are notified,
//!    so owners may read the wrapper from their handlers.

mod array;
mod date;
mod owners;

pub use array::Spliced;
pub use owners::OwnerSet;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::id::SubscriberId;
use crate::subscriber::Subscriber;
use crate::value::CellValue;

struct Inner<T> {
    raw: RefCell<T>,
    owners: OwnerSet,
}

/// Shared, observable wrapper around an object value.
pub struct Observed<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Observed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Observed<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Observed<T> {}

impl<T: fmt::Debug> fmt::Debug for Observed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("raw", &*self.inner.raw.borrow())
            .field("owners", &self.inner.owners)
            .finish()
    }
}

impl<T: Default> Default for Observed<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Observed<T> {
    fn from(raw: T) -> Self {
        Self::new(raw)
    }
}

impl<T> Observed<T> {
    /// Wrap a raw value.
    pub fn new(raw: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                raw: RefCell::new(raw),
                owners: OwnerSet::new(),
            }),
        }
    }

    /// Whether both handles refer to the same wrapper.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Cells currently owning this wrapper.
    #[must_use]
    pub fn owners(&self) -> &OwnerSet {
        &self.inner.owners
    }

    /// Borrow the raw value without notifying anyone.
    pub fn with_raw<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.raw.borrow())
    }

    /// Clone the raw value without notifying anyone.
    #[must_use]
    pub fn get_raw(&self) -> T
    where
        T: Clone,
    {
        self.inner.raw.borrow().clone()
    }

    /// Read through the wrapper; owners are told `field` was read.
    pub fn get_field<R>(&self, field: &str, f: impl FnOnce(&T) -> R) -> R {
        let value = f(&self.inner.raw.borrow());
        self.inner.owners.notify_read(field);
        value
    }

    /// Write one field. No-op (and no notification) if the value is equal.
    ///
    /// Returns whether the field changed.
    pub fn set_field<F: PartialEq>(
        &self,
        field: &str,
        lens: impl FnOnce(&mut T) -> &mut F,
        value: F,
    ) -> bool {
        {
            let mut raw = self.inner.raw.borrow_mut();
            let slot = lens(&mut raw);
            if *slot == value {
                tracing::trace!(field, "observed: unchanged field write ignored");
                return false;
            }
            *slot = value;
        }
        self.notify_changed(field);
        true
    }

    /// Apply an arbitrary in-place change and notify once.
    ///
    /// `f` runs while the raw value is borrowed and must not touch this
    /// wrapper.
    pub fn mutate<R>(&self, field: &str, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.raw.borrow_mut());
        self.notify_changed(field);
        result
    }

    /// Like [`mutate`](Self::mutate), but `f` works on the value moved out of
    /// the wrapper. Reads through the wrapper from inside `f` see
    /// `T::default()`; writes made from inside `f` are overwritten.
    pub(crate) fn mutate_detached<R>(&self, field: &str, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default,
    {
        let mut raw = std::mem::take(&mut *self.inner.raw.borrow_mut());
        let result = f(&mut raw);
        *self.inner.raw.borrow_mut() = raw;
        self.notify_changed(field);
        result
    }

    /// Replace the whole raw value, keeping the wrapper identity.
    pub fn replace(&self, raw: T) -> T {
        self.mutate("*", |current| std::mem::replace(current, raw))
    }

    pub(crate) fn mutate_if<R>(
        &self,
        field: &str,
        f: impl FnOnce(&mut T) -> (R, bool),
    ) -> R {
        let (result, changed) = f(&mut self.inner.raw.borrow_mut());
        if changed {
            self.notify_changed(field);
        }
        result
    }

    fn notify_changed(&self, field: &str) {
        tracing::trace!(field, owners = self.inner.owners.len(), "observed: field changed");
        self.inner.owners.notify_changed(field);
    }
}

impl<T: Clone + 'static> CellValue for Observed<T> {
    const IS_OBJECT: bool = true;

    fn attach_owner(&self, owner: SubscriberId, handle: Weak<dyn Subscriber>) {
        self.inner.owners.add(owner, handle);
    }

    fn detach_owner(&self, owner: SubscriberId) {
        self.inner.owners.remove(owner);
    }

    fn shallow_copy(&self) -> Self {
        Self::new(self.get_raw())
    }
}

/// Generate a trait of per-field accessors for `Observed<Struct>`.
///
/// Each field gets a getter (a read through [`Observed::get_field`]) and a
/// setter (an equality-checked [`Observed::set_field`]).
///
/// # Examples
///
/// ```
/// use stategraph_core::{Observed, observed_fields};
///
/// #[derive(Clone)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// observed_fields! {
///     pub trait PointFields for Point {
///         x, set_x: i32;
///         y, set_y: i32;
///     }
/// }
///
/// let p = Observed::new(Point { x: 1, y: 2 });
/// assert!(p.set_x(5));
/// assert!(!p.set_x(5));
/// assert_eq!(p.x(), 5);
/// ```
#[macro_export]
macro_rules! observed_fields {
    (
        $vis:vis trait $name:ident for $ty:ty {
            $( $field:ident, $setter:ident : $fty:ty; )*
        }
    ) => {
        $vis trait $name {
            $(
                fn $field(&self) -> $fty;
                fn $setter(&self, value: $fty) -> bool;
            )*
        }

        impl $name for $crate::Observed<$ty> {
            $(
                fn $field(&self) -> $fty {
                    self.get_field(stringify!($field), |raw| {
                        ::std::clone::Clone::clone(&raw.$field)
                    })
                }

                fn $setter(&self, value: $fty) -> bool {
                    self.set_field(stringify!($field), |raw| &mut raw.$field, value)
                }
            )*
        }
    };
}
