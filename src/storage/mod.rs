use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

pub(crate) const TOKEN_KEY: &str = "zetsubou_token";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage is unavailable")]
    Unavailable,
    #[error("storage write failed: {0}")]
    Write(String),
    #[error("could not encode value: {0}")]
    Encode(String),
}

/// Durable string key/value store (browser localStorage or an in-memory stand-in).
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub type SharedStore = Rc<dyn KeyValueStore>;

/// Session-only store. Used off-browser and in tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    items: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// `window.localStorage`.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserStorage;

#[cfg(target_arch = "wasm32")]
impl BrowserStorage {
    fn storage() -> Result<web_sys::Storage, StorageError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .ok_or(StorageError::Unavailable)
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for BrowserStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::storage()?
            .get_item(key)
            .map_err(|_| StorageError::Unavailable)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|e| StorageError::Write(format!("{e:?}")))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        Self::storage()?
            .remove_item(key)
            .map_err(|e| StorageError::Write(format!("{e:?}")))
    }
}

/// The durable store for this runtime: localStorage in the browser, memory elsewhere.
pub fn default_store() -> SharedStore {
    #[cfg(target_arch = "wasm32")]
    {
        Rc::new(BrowserStorage)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        Rc::new(MemoryStore::new())
    }
}

/// Read and decode a JSON value.
///
/// Absent keys, unreadable storage and corrupt JSON all come back as `None`;
/// corruption is logged and otherwise treated as a first run.
pub fn load_json<T: for<'de> Deserialize<'de>>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let json = match store.get(key) {
        Ok(Some(json)) => json,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "storage read failed");
            return None;
        }
    };

    match serde_json::from_str(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding malformed stored value");
            None
        }
    }
}

pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|e| StorageError::Encode(e.to_string()))?;
    store.set(key, &json)
}

pub(crate) fn load_token(store: &dyn KeyValueStore) -> Option<String> {
    store
        .get(TOKEN_KEY)
        .ok()
        .flatten()
        .filter(|t| !t.trim().is_empty())
}
