//! A store that discards everything. Useful for measuring the overhead of the workload engine
//! itself.
//!
//! ## Configuration Format
//!
//! ``` toml
//! [store]
//! name = "null"
//! ```

use crate::stores::Registry;
use crate::{KVStore, KVStoreHandle, StoreError};

#[derive(Clone)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }

    pub fn new_boxed(_opt: &toml::Table) -> Box<dyn KVStore> {
        Box::new(Self::new())
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KVStore for NullStore {
    fn handle(&self) -> Box<dyn KVStoreHandle> {
        Box::new(self.clone())
    }
}

impl KVStoreHandle for NullStore {
    fn put(&mut self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Ok(())
    }

    fn get(&mut self, _key: &str, _fields: Option<&[String]>) -> Result<Option<Box<[u8]>>, StoreError> {
        Ok(None)
    }
}

inventory::submit! {
    Registry::new("null", NullStore::new_boxed)
}
