//! Keyed registry of shared handles.
//!
//! A [`Pool`] maps string keys to lazily-constructed values. Repeated
//! `get` calls with the same key return the same `Arc`; the value is built
//! by the factory bound when the pool was created.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

type Factory<T> = Arc<dyn Fn(&str) -> T + Send + Sync>;

pub struct Pool<T> {
    name: String,
    items: Mutex<IndexMap<String, Arc<T>>>,
    factory: Factory<T>,
}

impl<T> Pool<T> {
    /// The factory runs under the pool lock and must not call back into this pool.
    pub fn new(name: impl Into<String>, factory: impl Fn(&str) -> T + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(IndexMap::new()),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Arc<T>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the value for `key`, constructing and storing it on first use.
    pub fn get(&self, key: &str) -> Arc<T> {
        let mut items = self.lock();
        if let Some(item) = items.get(key) {
            return Arc::clone(item);
        }
        let item = Arc::new((self.factory)(key));
        items.insert(key.to_string(), Arc::clone(&item));
        item
    }

    /// Return the value for `key` without constructing one.
    pub fn get_existing(&self, key: &str) -> Option<Arc<T>> {
        self.lock().get(key).cloned()
    }

    /// Store `item` under `key`, replacing any previous value.
    pub fn add(&self, key: impl Into<String>, item: Arc<T>) {
        self.lock().insert(key.into(), item);
    }

    pub fn exists(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Remove `key`, keeping the insertion order of the remaining entries.
    pub fn delete(&self, key: &str) -> Option<Arc<T>> {
        self.lock().shift_remove(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn num(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.num() == 0
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn first(&self) -> Option<String> {
        self.lock().first().map(|(k, _)| k.clone())
    }

    pub fn last(&self) -> Option<String> {
        self.lock().last().map(|(k, _)| k.clone())
    }

    /// Snapshot of all entries in insertion order.
    pub fn entries(&self) -> Vec<(String, Arc<T>)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }
}

impl<T: Default> Pool<T> {
    /// Pool whose values start as `T::default()`.
    pub fn with_default(name: impl Into<String>) -> Self {
        Self::new(name, |_| T::default())
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("keys", &self.keys())
            .finish()
    }
}
