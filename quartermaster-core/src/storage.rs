//! Durable string-keyed snapshot slots.
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Key the campaign snapshot is written under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "campaign.state";

/// Key of the sync outbox stored next to a snapshot.
#[must_use]
pub fn outbox_key(storage_key: &str) -> String {
    format!("{storage_key}.outbox")
}

/// Trait for abstracting the local key-value slot.
/// Platform-specific implementations should provide this
pub trait SnapshotStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the raw value stored under `key`, `None` if nothing was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Overwrite the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryStoreError {
    #[error("read of `{0}` refused")]
    ReadRefused(String),
    #[error("write of `{0}` refused")]
    WriteRefused(String),
}

/// In-memory slots. Clones share the same backing map, so a test can keep a
/// handle while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Rc<RefCell<HashMap<String, String>>>,
    refuse_reads: Rc<Cell<bool>>,
    refuse_writes: Rc<Cell<bool>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one value.
    #[must_use]
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::default();
        store
            .slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        store
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.slots.borrow().get(key).cloned()
    }

    /// Make every following read fail.
    pub fn refuse_reads(&self, refuse: bool) {
        self.refuse_reads.set(refuse);
    }

    /// Make every following write fail.
    pub fn refuse_writes(&self, refuse: bool) {
        self.refuse_writes.set(refuse);
    }
}

impl SnapshotStore for MemoryStore {
    type Error = MemoryStoreError;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        if self.refuse_reads.get() {
            return Err(MemoryStoreError::ReadRefused(key.to_string()));
        }
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        if self.refuse_writes.get() {
            return Err(MemoryStoreError::WriteRefused(key.to_string()));
        }
        self.slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_slots() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.write(DEFAULT_STORAGE_KEY, "{}").unwrap();
        assert_eq!(handle.read(DEFAULT_STORAGE_KEY).unwrap().as_deref(), Some("{}"));
        assert_eq!(handle.read("other").unwrap(), None);
    }

    #[test]
    fn refusals_surface_as_errors() {
        let store = MemoryStore::with_value("k", "v");
        store.refuse_reads(true);
        assert_eq!(
            store.read("k"),
            Err(MemoryStoreError::ReadRefused("k".to_string()))
        );
        store.refuse_writes(true);
        assert!(store.write("k", "w").is_err());
        store.refuse_reads(false);
        assert_eq!(store.read("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn outbox_key_is_derived_from_snapshot_key() {
        assert_eq!(outbox_key(DEFAULT_STORAGE_KEY), "campaign.state.outbox");
    }
}
