//! Id-keyed ownership container for producers and consumers.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Exclusively owns entries keyed by their id.
///
/// Iteration and [`Registry::close_all`] visit entries in id order, which
/// is the "registry order" every transport-wide walk relies on.
pub struct Registry<T> {
    kind: &'static str,
    entries: BTreeMap<String, T>,
}

impl<T> Registry<T> {
    /// `kind` names the entries in error messages, e.g. `"producer"`.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, id: String, entry: T) -> Result<()> {
        match self.entries.entry(id) {
            btree_map::Entry::Occupied(occupied) => {
                Err(Error::ErrDuplicateId(occupied.key().clone()))
            }
            btree_map::Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Removes an entry and hands its ownership back to the caller.
    pub fn remove(&mut self, id: &str) -> Result<T> {
        self.entries.remove(id).ok_or_else(|| self.not_found(id))
    }

    pub fn get(&self, id: &str) -> Result<&T> {
        self.entries.get(id).ok_or_else(|| self.not_found(id))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut T> {
        let kind = self.kind;
        self.entries
            .get_mut(id)
            .ok_or_else(|| Error::ErrNotFound(format!("{kind} {id}")))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }

    /// Empties the registry, then hands every former entry to `on_close`
    /// in id order.
    ///
    /// The entries are detached before the first callback runs, so the
    /// callback never observes a half-cleared registry. Calling this on an
    /// empty registry does nothing.
    pub fn close_all<F>(&mut self, mut on_close: F)
    where
        F: FnMut(String, T),
    {
        let entries = std::mem::take(&mut self.entries);
        for (id, entry) in entries {
            on_close(id, entry);
        }
    }

    fn not_found(&self, id: &str) -> Error {
        Error::ErrNotFound(format!("{} {}", self.kind, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_rejects_duplicate_id() {
        let mut registry = Registry::new("producer");
        registry.add("a".to_owned(), 1).unwrap();

        assert_eq!(
            registry.add("a".to_owned(), 2),
            Err(Error::ErrDuplicateId("a".to_owned()))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a"), Ok(&1));
    }

    #[test]
    fn test_remove_and_get_missing() {
        let mut registry: Registry<u32> = Registry::new("consumer");

        assert_eq!(
            registry.remove("x"),
            Err(Error::ErrNotFound("consumer x".to_owned()))
        );
        assert!(registry.get("x").is_err());
        assert!(registry.get_mut("x").is_err());

        registry.add("x".to_owned(), 7).unwrap();
        *registry.get_mut("x").unwrap() += 1;
        assert_eq!(registry.remove("x"), Ok(8));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_all_visits_in_id_order_and_is_idempotent() {
        let mut registry = Registry::new("producer");
        for id in ["c", "a", "b"] {
            registry.add(id.to_owned(), id.to_uppercase()).unwrap();
        }

        let mut closed = vec![];
        registry.close_all(|id, entry| closed.push((id, entry)));
        assert_eq!(
            closed,
            vec![
                ("a".to_owned(), "A".to_owned()),
                ("b".to_owned(), "B".to_owned()),
                ("c".to_owned(), "C".to_owned()),
            ]
        );
        assert!(registry.is_empty());

        let mut calls = 0;
        registry.close_all(|_, _| calls += 1);
        assert_eq!(calls, 0);
    }
}
