#![forbid(unsafe_code)]

//! Values that can live in a cell.
//!
//! [`CellValue`] unifies the two kinds of state a cell can hold:
//!
//! - **Primitives** (numbers, strings, `Option` of a primitive): compared by
//!   value, copied freely, no ownership hooks.
//! - **Objects** ([`Observed`](crate::Observed) wrappers and user types built
//!   on [`OwnerSet`](crate::OwnerSet)): compared by identity, and the cell
//!   holding one registers itself as the wrapper's owner so in-place mutation
//!   reaches it.
//!
//! Link and prop cells are generic over `CellValue`; their object and
//! primitive behaviors follow from [`CellValue::IS_OBJECT`] and the hooks.

use std::rc::Weak;

use crate::id::SubscriberId;
use crate::subscriber::Subscriber;

/// A value storable in a property cell.
pub trait CellValue: Clone + PartialEq + 'static {
    /// Whether this is an object-typed (wrapper) value.
    const IS_OBJECT: bool = false;

    /// The "null/undefined" case. Stores refuse to hold absent values.
    fn is_absent(&self) -> bool {
        false
    }

    /// Register `owner` to be notified of in-place mutation.
    fn attach_owner(&self, _owner: SubscriberId, _handle: Weak<dyn Subscriber>) {}

    /// Undo [`attach_owner`](Self::attach_owner).
    fn detach_owner(&self, _owner: SubscriberId) {}

    /// The copy a one-way prop holds. Objects get a new identity sharing
    /// the same field values; primitives are cloned.
    #[must_use]
    fn shallow_copy(&self) -> Self {
        self.clone()
    }
}

macro_rules! primitive_cell_value {
    ($($ty:ty),* $(,)?) => {
        $(impl CellValue for $ty {})*
    };
}

primitive_cell_value!(
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
    (),
);

impl<T: CellValue> CellValue for Option<T> {
    const IS_OBJECT: bool = T::IS_OBJECT;

    fn is_absent(&self) -> bool {
        self.is_none()
    }

    fn attach_owner(&self, owner: SubscriberId, handle: Weak<dyn Subscriber>) {
        if let Some(value) = self {
            value.attach_owner(owner, handle);
        }
    }

    fn detach_owner(&self, owner: SubscriberId) {
        if let Some(value) = self {
            value.detach_owner(owner);
        }
    }

    fn shallow_copy(&self) -> Self {
        self.as_ref().map(CellValue::shallow_copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observed::Observed;

    #[test]
    fn primitives_are_not_objects() {
        assert!(!<i32 as CellValue>::IS_OBJECT);
        assert!(!<String as CellValue>::IS_OBJECT);
        assert!(<Observed<Vec<i32>> as CellValue>::IS_OBJECT);
        assert!(<Option<Observed<u8>> as CellValue>::IS_OBJECT);
    }

    #[test]
    fn option_none_is_absent() {
        assert!(None::<i32>.is_absent());
        assert!(!Some(3).is_absent());
        assert!(!0_u8.is_absent());
    }
}
