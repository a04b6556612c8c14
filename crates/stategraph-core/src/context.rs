#![forbid(unsafe_code)]

//! The explicit state context.
//!
//! A [`StateContext`] owns everything that would otherwise be process-global:
//! the subscriber [`Registry`], the [`RenderTracker`], the active
//! [`StateConfig`], and the lazily created application-wide [`Storage`].
//! It is a cheap handle (`Rc`); clones refer to the same context.
//!
//! # Lifecycle
//!
//! 1. Create with [`StateContext::new`] or [`StateContext::with_config`].
//! 2. Pass clones to every cell, store and view.
//! 3. Call [`StateContext::teardown`] when the UI instance goes away. This
//!    clears the application store and the registry, breaking the only
//!    reference cycle the context participates in.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::StateConfig;
use crate::registry::Registry;
use crate::storage::Storage;
use crate::tracker::RenderTracker;

struct ContextInner {
    config: StateConfig,
    registry: Registry,
    tracker: RenderTracker,
    app_storage: RefCell<Option<Rc<Storage>>>,
}

/// Shared handle to registry, render tracker, config and app storage.
#[derive(Clone)]
pub struct StateContext {
    inner: Rc<ContextInner>,
}

impl StateContext {
    /// A context with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    #[must_use]
    pub fn with_config(config: StateConfig) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                config,
                registry: Registry::new(),
                tracker: RenderTracker::new(),
                app_storage: RefCell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StateConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    #[must_use]
    pub fn tracker(&self) -> &RenderTracker {
        &self.inner.tracker
    }

    /// The application-wide store, created on first use.
    pub fn app_storage(&self) -> Rc<Storage> {
        let mut slot = self.inner.app_storage.borrow_mut();
        Rc::clone(slot.get_or_insert_with(|| {
            tracing::debug!("creating app storage");
            Rc::new(Storage::new(self))
        }))
    }

    /// Whether the application-wide store has been created.
    #[must_use]
    pub fn has_app_storage(&self) -> bool {
        self.inner.app_storage.borrow().is_some()
    }

    /// Whether two handles refer to the same context.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Release the app storage and all registry entries.
    ///
    /// Store entries that still have subscribers are logged and dropped
    /// anyway; the context is unusable for propagation afterwards.
    pub fn teardown(&self) {
        let storage = self.inner.app_storage.borrow_mut().take();
        if let Some(storage) = storage {
            if !storage.clear() {
                tracing::warn!(
                    remaining = storage.size(),
                    "teardown: app storage still had subscribed entries"
                );
            }
        }
        let stale = self.inner.registry.purge_dead();
        let live = self.inner.registry.len();
        if live > 0 {
            tracing::debug!(live, stale, "teardown: clearing live registry entries");
        }
        self.inner.registry.clear();
    }
}

impl Default for StateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("tracker", &self.inner.tracker)
            .field("has_app_storage", &self.has_app_storage())
            .finish()
    }
}
