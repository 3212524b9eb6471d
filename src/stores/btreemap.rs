//! Adapter implementation of [`std::collections::BTreeMap`] behind a [`RwLock`].
//!
//! ## Configuration Format
//!
//! ``` toml
//! [store]
//! name = "rwlock_btreemap"
//! ```

use crate::stores::Registry;
use crate::{KVStore, KVStoreHandle, StoreError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct RwLockBTreeMap(Arc<RwLock<BTreeMap<String, Box<[u8]>>>>);

impl RwLockBTreeMap {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(BTreeMap::new())))
    }

    pub fn new_boxed(_opt: &toml::Table) -> Box<dyn KVStore> {
        Box::new(Self::new())
    }
}

impl Default for RwLockBTreeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl KVStore for RwLockBTreeMap {
    fn handle(&self) -> Box<dyn KVStoreHandle> {
        Box::new(self.clone())
    }
}

impl KVStoreHandle for RwLockBTreeMap {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.0.write().insert(key.to_string(), value.into());
        Ok(())
    }

    fn get(&mut self, key: &str, _fields: Option<&[String]>) -> Result<Option<Box<[u8]>>, StoreError> {
        Ok(self.0.read().get(key).cloned())
    }
}

inventory::submit! {
    Registry::new("rwlock_btreemap", RwLockBTreeMap::new_boxed)
}
