//! Adapter implementation of [`hashbrown::HashMap`]. Internally sharded.
//!
//! ## Configuration Format
//!
//! ``` toml
//! [store]
//! name = "mutex_hashmap"
//! shards = ... # number of shards
//! ```

use crate::stores::Registry;
use crate::{KVStore, KVStoreHandle, StoreError};
use hashbrown::HashMap;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use serde::Deserialize;
use std::hash::Hasher;
use std::sync::Arc;

fn shard(key: &str, nr_shards: usize) -> usize {
    let mut hasher = FxHasher::default();
    hasher.write(key.as_bytes());
    hasher.finish() as usize % nr_shards
}

/// A wrapper around raw [`HashMap`] with string keys and opaque values. It is the building
/// block of each shard; note that this on its own is not a [`KVStore`].
pub type BaseHashMap = HashMap<String, Box<[u8]>>;

#[derive(Clone)]
pub struct MutexHashMap {
    nr_shards: usize,
    shards: Arc<Vec<Mutex<BaseHashMap>>>,
}

#[derive(Deserialize)]
pub struct MutexHashMapOpt {
    pub shards: usize,
}

impl MutexHashMap {
    pub fn new(opt: &MutexHashMapOpt) -> Self {
        let nr_shards = opt.shards;
        assert!(nr_shards > 0, "shards should be positive");
        let mut shards = Vec::<Mutex<BaseHashMap>>::with_capacity(nr_shards);
        for _ in 0..nr_shards {
            shards.push(Mutex::new(BaseHashMap::new()));
        }
        let shards = Arc::new(shards);
        Self { nr_shards, shards }
    }

    pub fn new_boxed(opt: &toml::Table) -> Box<dyn KVStore> {
        let opt: MutexHashMapOpt = opt.clone().try_into().unwrap();
        Box::new(Self::new(&opt))
    }
}

impl KVStore for MutexHashMap {
    fn handle(&self) -> Box<dyn KVStoreHandle> {
        Box::new(self.clone())
    }
}

impl KVStoreHandle for MutexHashMap {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let sid = shard(key, self.nr_shards);
        self.shards[sid].lock().insert(key.to_string(), value.into());
        Ok(())
    }

    fn get(&mut self, key: &str, _fields: Option<&[String]>) -> Result<Option<Box<[u8]>>, StoreError> {
        let sid = shard(key, self.nr_shards);
        Ok(self.shards[sid].lock().get(key).cloned())
    }
}

inventory::submit! {
    Registry::new("mutex_hashmap", MutexHashMap::new_boxed)
}
