#![forbid(unsafe_code)]

//! Provided variables.
//!
//! A view provides a cell under a name; any descendant can consume it by
//! name and receives a two-way link. Each view carries a snapshot of its
//! ancestors' provided variables taken when it was created, so lookup never
//! walks the tree.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use stategraph_core::{CellValue, SourceRef, SubscriberId};

#[derive(Clone)]
struct ProvidedVar {
    provider: SubscriberId,
    value_type: &'static str,
    source: Rc<dyn Any>,
}

/// Name → source table. Cloning shares the sources.
#[derive(Clone, Default)]
pub(crate) struct ProvidedVars {
    vars: AHashMap<String, ProvidedVar>,
}

impl ProvidedVars {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Insert unless the name is taken. Returns the current provider on
    /// conflict.
    pub(crate) fn insert<V: CellValue>(
        &mut self,
        name: &str,
        provider: SubscriberId,
        source: SourceRef<V>,
    ) -> Result<(), SubscriberId> {
        if let Some(existing) = self.vars.get(name) {
            return Err(existing.provider);
        }
        self.vars.insert(
            name.to_owned(),
            ProvidedVar {
                provider,
                value_type: std::any::type_name::<V>(),
                source: Rc::new(source),
            },
        );
        Ok(())
    }

    /// Look up `name`. `Ok(None)` if missing, `Err(stored type)` if present
    /// with another value type.
    pub(crate) fn get<V: CellValue>(
        &self,
        name: &str,
    ) -> Result<Option<SourceRef<V>>, &'static str> {
        let Some(var) = self.vars.get(name) else {
            return Ok(None);
        };
        match Rc::clone(&var.source).downcast::<SourceRef<V>>() {
            Ok(source) => Ok(Some(Rc::clone(&source))),
            Err(_) => Err(var.value_type),
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn clear(&mut self) {
        self.vars.clear();
    }
}

impl fmt::Debug for ProvidedVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.vars.iter().map(|(name, var)| (name, var.provider)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stategraph_core::{AbstractProperty, ObservedProperty, StateContext};

    #[test]
    fn names_are_unique_and_typed() {
        let ctx = StateContext::new();
        let theme = ObservedProperty::new(&ctx, "dark".to_string(), None, "theme");
        let mut vars = ProvidedVars::new();
        let provider = SubscriberId::new(1);

        assert!(vars.insert("theme", provider, theme.as_source()).is_ok());
        assert_eq!(
            vars.insert("theme", SubscriberId::new(2), theme.as_source()),
            Err(provider)
        );

        let found = vars.get::<String>("theme").expect("same type").expect("present");
        assert_eq!(found.get_unmonitored(), "dark");
        assert!(vars.get::<i32>("theme").is_err());
        assert!(matches!(vars.get::<String>("missing"), Ok(None)));
    }

    #[test]
    fn clones_share_sources() {
        let ctx = StateContext::new();
        let cell = ObservedProperty::new(&ctx, 1, None, "n");
        let mut parent = ProvidedVars::new();
        parent
            .insert("n", SubscriberId::new(1), cell.as_source())
            .expect("fresh name");
        let child = parent.clone();
        cell.set(2);
        let source = child.get::<i32>("n").expect("typed").expect("present");
        assert_eq!(source.get_unmonitored(), 2);
        assert!(child.contains("n"));
        assert_eq!(child.names(), vec!["n".to_string()]);
    }
}
