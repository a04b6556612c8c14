#![forbid(unsafe_code)]

//! Array mutators for `Observed<Vec<T>>`.
//!
//! Each mutator applies to the raw vector and fires exactly one notification
//! per call. Chainable mutators return `&Observed<Vec<T>>`; `splice` returns
//! a [`Spliced`] handle that derefs to the wrapper, so a chain stays routed
//! through the interception point.
//!
//! `pop`, `shift` and `truncate` notify only when they removed something.

use std::ops::{Deref, Range};

use super::Observed;

/// Result of [`Observed::splice`]: the wrapper plus the removed items.
#[must_use = "use `removed()` or keep chaining through the wrapper"]
pub struct Spliced<'a, T> {
    wrapper: &'a Observed<Vec<T>>,
    removed: Vec<T>,
}

impl<T> Spliced<'_, T> {
    /// Items removed by the splice, in their original order.
    #[must_use]
    pub fn removed(&self) -> &[T] {
        &self.removed
    }

    #[must_use]
    pub fn into_removed(self) -> Vec<T> {
        self.removed
    }
}

impl<T> Deref for Spliced<'_, T> {
    type Target = Observed<Vec<T>>;

    fn deref(&self) -> &Self::Target {
        self.wrapper
    }
}

impl<T> Observed<Vec<T>> {
    /// Length, without notifying.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_raw(Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.with_raw(Vec::is_empty)
    }

    /// Read element `index` through the wrapper.
    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.get_field(&index.to_string(), |raw| raw.get(index).cloned())
    }

    /// Equality-checked write of an existing element.
    ///
    /// Returns `false` (and logs) when `index` is out of bounds.
    pub fn set_at(&self, index: usize, value: T) -> bool
    where
        T: PartialEq,
    {
        if index >= self.len() {
            tracing::warn!(index, len = self.len(), "observed array: set_at out of bounds");
            return false;
        }
        self.set_field(&index.to_string(), |raw| &mut raw[index], value)
    }

    pub fn push(&self, value: T) -> &Self {
        self.mutate("push", |raw| raw.push(value));
        self
    }

    pub fn pop(&self) -> Option<T> {
        self.mutate_if("pop", |raw| {
            let popped = raw.pop();
            let changed = popped.is_some();
            (popped, changed)
        })
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<T> {
        self.mutate_if("shift", |raw| {
            if raw.is_empty() {
                (None, false)
            } else {
                (Some(raw.remove(0)), true)
            }
        })
    }

    /// Insert at the front.
    pub fn unshift(&self, value: T) -> &Self {
        self.mutate("unshift", |raw| raw.insert(0, value));
        self
    }

    /// Remove `delete_count` items starting at `start` and insert `items`
    /// in their place. Both bounds are clamped to the current length.
    ///
    /// `items` is drained before the array changes, so it may read the
    /// wrapper.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = T>,
    ) -> Spliced<'_, T> {
        let items: Vec<T> = items.into_iter().collect();
        let removed = self.mutate("splice", |raw| {
            let start = start.min(raw.len());
            let end = start.saturating_add(delete_count).min(raw.len());
            raw.splice(start..end, items).collect()
        });
        Spliced {
            wrapper: self,
            removed,
        }
    }

    pub fn sort(&self) -> &Self
    where
        T: Ord,
    {
        self.mutate("sort", |raw| raw.sort());
        self
    }

    /// Stable sort with `compare`. The comparator may read the wrapper but
    /// sees it empty while the sort runs.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> std::cmp::Ordering) -> &Self {
        self.mutate_detached("sort", |raw| raw.sort_by(compare));
        self
    }

    pub fn reverse(&self) -> &Self {
        self.mutate("reverse", |raw| raw.reverse());
        self
    }

    /// Overwrite every element with `value`.
    pub fn fill(&self, value: T) -> &Self
    where
        T: Clone,
    {
        self.fill_range(value, 0..usize::MAX)
    }

    /// Overwrite elements in `range` (clamped) with `value`.
    pub fn fill_range(&self, value: T, range: Range<usize>) -> &Self
    where
        T: Clone,
    {
        self.mutate("fill", |raw| {
            let end = range.end.min(raw.len());
            let start = range.start.min(end);
            for slot in &mut raw[start..end] {
                *slot = value.clone();
            }
        });
        self
    }

    /// Copy the elements in `source` (clamped) to position `target`,
    /// overwriting in place without changing the length.
    pub fn copy_within(&self, source: Range<usize>, target: usize) -> &Self
    where
        T: Clone,
    {
        self.mutate("copyWithin", |raw| {
            let len = raw.len();
            let end = source.end.min(len);
            let start = source.start.min(end);
            let target = target.min(len);
            let count = (end - start).min(len - target);
            let copied: Vec<T> = raw[start..start + count].to_vec();
            raw[target..target + count].clone_from_slice(&copied);
        });
        self
    }

    pub fn truncate(&self, len: usize) -> &Self {
        self.mutate_if("length", |raw| {
            let changed = len < raw.len();
            raw.truncate(len);
            ((), changed)
        });
        self
    }

    pub fn clear(&self) -> &Self {
        self.truncate(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SubscriberId;
    use crate::subscriber::{Notification, Roles, Subscriber};
    use crate::value::CellValue;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    struct Hits(Cell<u32>);

    impl Subscriber for Hits {
        fn id(&self) -> SubscriberId {
            SubscriberId::new(1)
        }

        fn roles(&self) -> Roles {
            Roles::OBJECT_PROPERTY_CHANGED
        }

        fn notify(&self, _notification: &Notification<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn watched(values: Vec<i32>) -> (Observed<Vec<i32>>, Rc<Hits>) {
        let arr = Observed::new(values);
        let hits = Rc::new(Hits(Cell::new(0)));
        arr.attach_owner(hits.id(), Rc::downgrade(&hits) as Weak<dyn Subscriber>);
        (arr, hits)
    }

    #[test]
    fn push_then_splice_notifies_twice_and_chains() {
        let (arr, hits) = watched(vec![1, 2]);
        let spliced = arr.push(3).splice(0, 1, []);
        assert_eq!(spliced.removed(), &[1]);
        assert_eq!(hits.0.get(), 2);

        // still routed through the wrapper
        spliced.push(4);
        assert_eq!(hits.0.get(), 3);
        assert_eq!(arr.get_raw(), vec![2, 3, 4]);
    }

    #[test]
    fn in_place_methods_each_notify_once() {
        let (arr, hits) = watched(vec![3, 1, 2]);
        arr.sort().reverse().fill_range(0, 2..3).copy_within(0..1, 1);
        assert_eq!(hits.0.get(), 4);
        assert_eq!(arr.get_raw(), vec![3, 3, 0]);
    }

    #[test]
    fn removal_on_empty_is_silent() {
        let (arr, hits) = watched(Vec::new());
        assert_eq!(arr.pop(), None);
        assert_eq!(arr.shift(), None);
        arr.clear();
        assert_eq!(hits.0.get(), 0);

        arr.unshift(7).push(8);
        assert_eq!(arr.shift(), Some(7));
        assert_eq!(arr.pop(), Some(8));
        assert_eq!(hits.0.get(), 4);
    }

    #[test]
    fn set_at_is_bounds_and_equality_checked() {
        let (arr, hits) = watched(vec![1, 2]);
        assert!(!arr.set_at(1, 2));
        assert!(!arr.set_at(5, 0));
        assert!(arr.set_at(0, 9));
        assert_eq!(hits.0.get(), 1);
        assert_eq!(arr.get_at(0), Some(9));
    }

    #[test]
    fn splice_clamps_and_inserts() {
        let (arr, _hits) = watched(vec![1, 2, 3]);
        let removed = arr.splice(2, 10, [7, 8]).into_removed();
        assert_eq!(removed, vec![3]);
        assert_eq!(arr.get_raw(), vec![1, 2, 7, 8]);
        let removed = arr.splice(99, 1, [0]).into_removed();
        assert!(removed.is_empty());
        assert_eq!(arr.get_raw(), vec![1, 2, 7, 8, 0]);
    }

    #[test]
    fn callbacks_may_read_the_array() {
        let (arr, hits) = watched(vec![3, 1, 2]);
        let seen = Cell::new(usize::MAX);
        arr.sort_by(|a, b| {
            seen.set(arr.len());
            a.cmp(b)
        });
        assert_eq!(seen.get(), 0);
        assert_eq!(arr.get_raw(), vec![1, 2, 3]);

        let tail = (0..arr.len()).map(|index| arr.get_at(index).unwrap_or_default() + 10);
        arr.splice(0, 1, tail);
        assert_eq!(arr.get_raw(), vec![11, 12, 13, 2, 3]);
        assert_eq!(hits.0.get(), 2);
    }

    proptest! {
        #[test]
        fn splice_matches_vec_semantics(
            values in proptest::collection::vec(any::<i32>(), 0..16),
            start in 0usize..20,
            count in 0usize..20,
            insert in proptest::collection::vec(any::<i32>(), 0..4),
        ) {
            let (arr, hits) = watched(values.clone());
            let removed = arr.splice(start, count, insert.clone()).into_removed();

            let mut expected = values;
            let s = start.min(expected.len());
            let e = s.saturating_add(count).min(expected.len());
            let expected_removed: Vec<i32> = expected.splice(s..e, insert).collect();

            prop_assert_eq!(removed, expected_removed);
            prop_assert_eq!(arr.get_raw(), expected);
            prop_assert_eq!(hits.0.get(), 1);
        }

        #[test]
        fn copy_within_preserves_length(
            values in proptest::collection::vec(any::<u8>(), 0..16),
            start in 0usize..20,
            end in 0usize..20,
            target in 0usize..20,
        ) {
            let (arr, _hits) = watched(values.iter().map(|v| i32::from(*v)).collect());
            arr.copy_within(start..end, target);
            prop_assert_eq!(arr.len(), values.len());
        }
    }
}
