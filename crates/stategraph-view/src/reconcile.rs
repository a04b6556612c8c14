#![forbid(unsafe_code)]

//! Keyed list reconciliation.
//!
//! [`KeyedList`] keeps the children rendered for an item array, each tagged
//! with a string key. [`KeyedList::reconcile`] maps the previous children
//! onto a new array with as little node churn as possible:
//!
//! 1. generate the new keys (abort on a key generator failure, before any
//!    node is touched);
//! 2. split the old children into those whose key survives and a cache of
//!    those whose key does not;
//! 3. sweep the new array left to right: reuse the node with the same key,
//!    else recycle a cached node (if enabled), else create one;
//! 4. unmount every old node neither reused nor recycled.
//!
//! Afterwards the children are in exactly the new array's order.
//!
//! Duplicate keys are reported, with every participating index, but the
//! items are all still rendered: the first occurrence can reuse the old
//! node, later ones get fresh nodes.

use std::collections::VecDeque;
use std::fmt;

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use smallvec::SmallVec;
use stategraph_core::StateConfig;

/// One rendered child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedChild<N> {
    pub key: String,
    /// Index of the item this child is bound to.
    pub index: usize,
    pub node: N,
}

/// Host callbacks that create and maintain child nodes.
pub trait ChildFactory<T> {
    type Node;

    /// Instantiate a node for `item`.
    fn create(&mut self, item: &T, index: usize) -> Self::Node;

    /// Rebind a reused node to `item`.
    fn update(&mut self, node: &mut Self::Node, item: &T, index: usize);

    /// Rebind a node whose key disappeared to a new key's item.
    fn recycle(&mut self, node: &mut Self::Node, item: &T, index: usize) {
        self.update(node, item, index);
    }

    /// A reused node changed position.
    fn move_to(&mut self, _node: &mut Self::Node, _from: usize, _to: usize) {}

    /// Remove a node for good.
    fn unmount(&mut self, node: Self::Node);
}

type KeyFn<T> = Box<dyn Fn(&T, usize) -> Result<String, String>>;

/// Produces the key of each item.
pub struct KeyGenerator<T> {
    key: KeyFn<T>,
}

impl<T> KeyGenerator<T> {
    /// A fallible generator from `(item, index)`.
    pub fn new(key: impl Fn(&T, usize) -> Result<String, String> + 'static) -> Self {
        Self { key: Box::new(key) }
    }

    /// Key from the item alone, optionally prefixed with `"{index}_"`.
    pub fn by_item(key: impl Fn(&T) -> String + 'static, index_prefix: bool) -> Self {
        Self::new(move |item, index| {
            let key = key(item);
            Ok(if index_prefix {
                format!("{index}_{key}")
            } else {
                key
            })
        })
    }

    /// Key from item and index.
    pub fn by_item_and_index(key: impl Fn(&T, usize) -> String + 'static) -> Self {
        Self::new(move |item, index| Ok(key(item, index)))
    }

    fn generate(&self, item: &T, index: usize) -> Result<String, String> {
        (self.key)(item, index)
    }
}

impl<T: Serialize> KeyGenerator<T> {
    /// The fallback: `"{index}__{json}"`.
    pub fn index_json() -> Self {
        Self::new(|item, index| {
            serde_json::to_string(item)
                .map(|json| format!("{index}__{json}"))
                .map_err(|err| err.to_string())
        })
    }
}

impl<T: Serialize> Default for KeyGenerator<T> {
    fn default() -> Self {
        Self::index_json()
    }
}

impl<T> fmt::Debug for KeyGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerator").finish_non_exhaustive()
    }
}

/// Reconciler switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOptions {
    /// Reuse nodes of vanished keys for new keys instead of creating nodes.
    /// Default: false
    pub recycle: bool,
}

impl ReconcileOptions {
    #[must_use]
    pub fn from_config(config: &StateConfig) -> Self {
        Self {
            recycle: config.recycle_list_nodes,
        }
    }
}

/// What one reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// New-array indices that got a freshly created node.
    pub created: Vec<usize>,
    pub reused: usize,
    pub recycled: usize,
    pub removed: usize,
    /// Reused nodes whose position changed.
    pub moved: usize,
    /// Indices of every item whose key was not unique, ascending.
    pub duplicates: Vec<usize>,
}

impl ReconcileReport {
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// Reconciliation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// The key generator failed for the item at `index`.
    KeyGeneration { index: usize, reason: String },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyGeneration { index, reason } => write!(
                f,
                "cannot generate a key for item {index} ({reason}); supply a key function"
            ),
        }
    }
}

impl std::error::Error for ReconcileError {}

/// The keyed children of one list element.
#[derive(Debug, Clone)]
pub struct KeyedList<N> {
    children: Vec<KeyedChild<N>>,
    options: ReconcileOptions,
}

impl<N> Default for KeyedList<N> {
    fn default() -> Self {
        Self::new(ReconcileOptions::default())
    }
}

impl<N> KeyedList<N> {
    #[must_use]
    pub fn new(options: ReconcileOptions) -> Self {
        Self {
            children: Vec::new(),
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    #[must_use]
    pub fn children(&self) -> &[KeyedChild<N>] {
        &self.children
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.children.iter().map(|child| child.key.as_str()).collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.children.iter().map(|child| &child.node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Unmount every child.
    pub fn clear<T, F>(&mut self, factory: &mut F)
    where
        F: ChildFactory<T, Node = N>,
    {
        for child in self.children.drain(..) {
            factory.unmount(child.node);
        }
    }

    /// Bring the children in line with `items`.
    pub fn reconcile<T, F>(
        &mut self,
        items: &[T],
        keys: &KeyGenerator<T>,
        factory: &mut F,
    ) -> Result<ReconcileReport, ReconcileError>
    where
        F: ChildFactory<T, Node = N>,
    {
        let new_keys = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                keys.generate(item, index)
                    .map_err(|reason| ReconcileError::KeyGeneration { index, reason })
            })
            .collect::<Result<Vec<String>, ReconcileError>>()?;

        let mut report = ReconcileReport {
            duplicates: duplicate_indices(&new_keys),
            ..ReconcileReport::default()
        };
        for &index in &report.duplicates {
            tracing::error!(
                index,
                key = %new_keys[index],
                "duplicate list key; keys must be unique"
            );
        }

        let surviving: AHashSet<&str> = new_keys.iter().map(String::as_str).collect();
        let mut old: Vec<Option<KeyedChild<N>>> =
            self.children.drain(..).map(Some).collect();
        let mut by_key: AHashMap<String, VecDeque<usize>> = AHashMap::new();
        let mut cache: VecDeque<usize> = VecDeque::new();
        for (position, child) in old.iter().enumerate() {
            let Some(child) = child else { continue };
            if surviving.contains(child.key.as_str()) {
                by_key.entry(child.key.clone()).or_default().push_back(position);
            } else {
                cache.push_back(position);
            }
        }

        let mut next = Vec::with_capacity(items.len());
        for (cursor, (item, key)) in items.iter().zip(new_keys).enumerate() {
            let reusable = by_key
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .and_then(|position| old[position].take().map(|child| (position, child)));
            if let Some((position, mut child)) = reusable {
                if position != cursor {
                    factory.move_to(&mut child.node, position, cursor);
                    report.moved += 1;
                }
                factory.update(&mut child.node, item, cursor);
                child.index = cursor;
                report.reused += 1;
                next.push(child);
                continue;
            }
            let recyclable = if self.options.recycle {
                cache.pop_front().and_then(|position| old[position].take())
            } else {
                None
            };
            if let Some(mut child) = recyclable {
                factory.recycle(&mut child.node, item, cursor);
                report.recycled += 1;
                next.push(KeyedChild {
                    key,
                    index: cursor,
                    node: child.node,
                });
                continue;
            }
            let node = factory.create(item, cursor);
            report.created.push(cursor);
            next.push(KeyedChild {
                key,
                index: cursor,
                node,
            });
        }

        for child in old.into_iter().flatten() {
            factory.unmount(child.node);
            report.removed += 1;
        }
        self.children = next;

        tracing::debug!(
            len = self.children.len(),
            created = report.created.len(),
            reused = report.reused,
            recycled = report.recycled,
            removed = report.removed,
            "list reconciled"
        );
        Ok(report)
    }
}

fn duplicate_indices(keys: &[String]) -> Vec<usize> {
    let mut groups: AHashMap<&str, SmallVec<[usize; 2]>> = AHashMap::new();
    for (index, key) in keys.iter().enumerate() {
        groups.entry(key.as_str()).or_default().push(index);
    }
    let mut duplicates: Vec<usize> = groups
        .into_values()
        .filter(|indices| indices.len() > 1)
        .flatten()
        .collect();
    duplicates.sort_unstable();
    duplicates
}
