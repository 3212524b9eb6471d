#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! A synthetic workload generator for benchmarking key-value stores.
//!
//! `kvload` produces a statistically-controlled stream of insert and read/write operations
//! against a store under test. The proportions of mixed operations, the key access pattern
//! (uniform, zipfian, or skewed towards the latest inserts), the key space size and the insert
//! order are all driven by a flat TOML property set.
//!
//! A benchmark consists of two phases: a *load* phase that populates the store with
//! `record_count` records via [`workload::CoreWorkload::do_insert`], and a *run* phase that
//! issues `operation_count` mixed transactions via [`workload::CoreWorkload::do_transaction`].
//! Both entry points are safe to call from many worker threads; the only shared mutable state
//! is an atomic key sequence.
//!
//! You can also run the workload against your own key-value store: implement [`KVStore`] and
//! [`KVStoreHandle`], register a constructor with the [`stores`] registry, and reuse the
//! exported [`cmdline()`] in your `main` function.
//!
//! A few key design choices include:
//!
//! - Store keys are strings formed by a configurable prefix and a logical key number, values
//!   are opaque byte arrays of a configured length.
//! - Key selection generators form a closed set of variants dispatched by pattern match, not
//!   open-ended trait objects.
//! - The workload and store configurations are black boxes created dynamically from TOML.
//!
//! More detailed usage could be found in the module-level rustdocs:
//!
//! - [`mod@workload`] for the recognized workload properties and their defaults.
//! - [`mod@stores`] for the config format of a built-in key-value store.
//! - [`cmdline()`] for the usage of the default command line interface.

use thiserror::Error;

/// An opaque failure reported by a store driver.
///
/// The engine does not interpret the failure kind; whether it is transient or permanent is a
/// policy that belongs to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Errors surfaced by the workload engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration input is invalid, e.g., an unrecognized distribution name. Fatal,
    /// raised during initialization and never retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// All operation proportions are zero so the operation chooser has no entries. Fatal,
    /// raised on the first draw.
    #[error("operation mix has no entries with positive proportion")]
    EmptyDistribution,

    /// An opaque store failure forwarded from a driver.
    #[error("store call failed: {0}")]
    Store(#[from] StoreError),
}

/// A synchronous, thread-safe key-value store under test.
///
/// This trait is used for owned stores, with which a per-thread handle can be created. For most
/// stores this can just be done with an `Arc` clone.
pub trait KVStore: Send + Sync + 'static {
    /// Create a handle that can be used by one worker thread.
    fn handle(&self) -> Box<dyn KVStoreHandle>;
}

/// A per-thread handle that references a [`KVStore`].
///
/// The handle is the real object that exposes the key-value interface consumed by the workload
/// engine. Both calls may fail with an opaque [`StoreError`]; the engine reports the outcome
/// but never retries.
pub trait KVStoreHandle {
    /// Adding a new key-value pair or blindly updating an existing key's value.
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieving the value of a key if it exists. When `fields` is given, a driver that
    /// understands record fields may fetch only those; drivers for opaque values ignore it.
    fn get(&mut self, key: &str, fields: Option<&[String]>) -> Result<Option<Box<[u8]>>, StoreError>;
}

pub mod bench;
mod cmdline;
pub mod generator;
pub mod remote;
pub mod stores;
pub mod workload;

pub use cmdline::cmdline;

pub extern crate inventory;
pub extern crate toml;
