use std::collections::btree_map::{self, BTreeMap};

use crate::error::Error;

/// Registry is the immutable set of declarations a store is built from.
///
/// Keys are unique; building a registry that names the same key twice fails rather than letting
/// one declaration silently shadow another.
#[derive(Clone, Debug)]
pub struct Registry<D> {
    entries: BTreeMap<String, D>,
}

impl<D> Registry<D> {
    pub fn new<I, K>(entries: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (key, definition) in entries {
            match map.entry(key.into()) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(definition);
                }
                btree_map::Entry::Occupied(slot) => {
                    return Err(Error::DuplicateKey {
                        key: slot.key().clone(),
                    });
                }
            }
        }
        Ok(Registry { entries: map })
    }

    pub fn get(&self, key: &str) -> Option<&D> {
        self.entries.get(key)
    }

    /// Like [Registry::get], also returning the registry's own copy of the key.
    pub fn get_entry(&self, key: &str) -> Option<(&str, &D)> {
        self.entries
            .get_key_value(key)
            .map(|(k, d)| (k.as_str(), d))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Declared keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &D)> {
        self.entries.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
