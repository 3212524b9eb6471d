//! Adapters for the key-value stores under test.
//!
//! ## Built-in Stores
//!
//! The usage of built-in stores can be found in the module-level documentations. All of them
//! treat values as opaque byte arrays and ignore the optional field selection of a get.
//!
//! ## Registering New Stores
//!
//! When users would like to benchmark their own key-value store, they first implement
//! [`KVStore`]/[`KVStoreHandle`] for it. Then, they create a constructor function with a
//! signature of `fn(&toml::Table) -> Box<dyn KVStore>` and register it (along with a name)
//! using [`inventory`]. A minimal example would be: `inventory::submit! { Registry::new("name",
//! constructor_fn) };`.
//!
//! The source code of the built-in stores provides good examples on this process.

use crate::{Error, KVStore};
use hashbrown::HashMap;
use log::debug;
use serde::Deserialize;
use toml::Table;

/// The centralized registry that maps the name of a key-value store to its constructor.
///
/// A user-defined store can use the [`inventory::submit!`] macro to register its own
/// constructor to be used with the benchmark driver.
pub struct Registry<'a> {
    pub(crate) name: &'a str,
    constructor: fn(&Table) -> Box<dyn KVStore>,
}

impl<'a> Registry<'a> {
    pub const fn new(name: &'a str, constructor: fn(&Table) -> Box<dyn KVStore>) -> Self {
        Self { name, constructor }
    }
}

inventory::collect!(Registry<'static>);

/// An aggregated option that can be parsed from a TOML string. It contains the store's name
/// and an arbitrary table of store-specific parameters.
#[derive(Deserialize, Clone, Debug)]
pub struct StoreOpt {
    pub name: String,
    #[serde(flatten)]
    pub opt: Table,
}

/// Construct a registered store from its parsed options.
pub fn create(opt: &StoreOpt) -> Result<Box<dyn KVStore>, Error> {
    let mut registered: HashMap<&'static str, fn(&Table) -> Box<dyn KVStore>> = HashMap::new();
    for r in inventory::iter::<Registry> {
        debug!("adding registered store: {}", r.name);
        assert!(registered.insert(r.name, r.constructor).is_none()); // no duplicate names
    }
    match registered.get(opt.name.as_str()) {
        Some(f) => Ok(f(&opt.opt)),
        None => Err(Error::Config(format!(
            "store \"{}\" not found in registry",
            opt.name
        ))),
    }
}

pub mod btreemap;
pub mod hashmap;
pub mod null;
