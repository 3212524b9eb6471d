//! The core workload engine: turns a property set into a stream of operations.
//!
//! ## Configuration Format
//!
//! A workload is described by a flat TOML property set deserialized into [`WorkloadOpt`].
//! Unknown keys are ignored; missing keys fall back to the defaults documented on each field.
//! A minimal read-mostly workload over one thousand records looks like:
//!
//! ```toml
//! get_proportion = 0.95
//! set_proportion = 0.05
//! request_distribution = "uniform"
//! record_count = 1000
//! operation_count = 10000
//! ```
//!
//! ## Phases
//!
//! [`CoreWorkload`] exposes two entry points that one or more worker threads invoke repeatedly:
//! [`CoreWorkload::do_insert`] populates the store during a load phase, and
//! [`CoreWorkload::do_transaction`] issues one randomly chosen operation during a run phase.
//! Worker threads each own a clone of the engine; clones share only the atomic key sequences,
//! so no locks are taken on the hot path.

use crate::generator::{
    fnv1a_64, Counter, Discrete, ScrambledZipfian, SkewedLatest, Uniform, Zipfian,
    ZIPFIAN_CONSTANT,
};
use crate::{Error, KVStoreHandle};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use log::{debug, warn};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;

/// The kind of a single operation, drawn from the operation chooser. It carries no key or
/// value; those are generated when the operation is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Get,
    Set,
}

/// The distribution used to select record key numbers for reads.
#[derive(Clone, Debug)]
enum KeyChooser {
    Uniform(Uniform),
    ScrambledZipfian(ScrambledZipfian),
    SkewedLatest(SkewedLatest),
}

/// The distribution of scan lengths, favoring short scans when zipfian.
#[derive(Clone, Debug)]
enum ScanLength {
    Uniform(Uniform),
    Zipfian(Zipfian),
}

fn default_table() -> String {
    "usertable".to_string()
}

fn default_field_count() -> u64 {
    10
}

fn default_value_length() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_get_proportion() -> f64 {
    0.95
}

fn default_set_proportion() -> f64 {
    0.05
}

fn default_request_distribution() -> String {
    "uniform".to_string()
}

fn default_max_scan_length() -> u64 {
    1000
}

fn default_scan_length_distribution() -> String {
    "uniform".to_string()
}

fn default_insert_order() -> String {
    "hashed".to_string()
}

fn default_key_prefix() -> String {
    "user".to_string()
}

/// A structure that can be deserialized from a TOML string, holding the recognized workload
/// properties. This is the configuration input of [`CoreWorkload::new`].
#[derive(Deserialize, Clone, Debug)]
pub struct WorkloadOpt {
    /// The name of the table the workload runs against. Default: `"usertable"`.
    #[serde(default = "default_table")]
    pub table: String,

    /// The number of fields in a record. Default: 10.
    #[serde(default = "default_field_count")]
    pub field_count: u64,

    /// The length in bytes of the value stored with each key. Default: 256.
    #[serde(default = "default_value_length")]
    pub value_length: usize,

    /// Whether reads fetch all fields (true) or a single random field (false). Default: true.
    #[serde(default = "default_true")]
    pub read_all_fields: bool,

    /// Whether writes rewrite all fields (true) or one (false). Parsed for compatibility with
    /// the property set; the string-valued stores here always write the whole value.
    /// Default: false.
    #[serde(default)]
    pub write_all_fields: bool,

    /// The proportion of transactions that are gets. Default: 0.95.
    #[serde(default = "default_get_proportion")]
    pub get_proportion: f64,

    /// The proportion of transactions that are sets. Default: 0.05.
    #[serde(default = "default_set_proportion")]
    pub set_proportion: f64,

    /// The distribution used to select records to operate on: `"uniform"`, `"zipfian"` or
    /// `"latest"`. Default: `"uniform"`.
    #[serde(default = "default_request_distribution")]
    pub request_distribution: String,

    /// The maximum number of records a scan would cover. Default: 1000.
    #[serde(default = "default_max_scan_length")]
    pub max_scan_length: u64,

    /// The distribution of scan lengths between 1 and `max_scan_length`: `"uniform"` or
    /// `"zipfian"` (favoring short scans). Default: `"uniform"`.
    #[serde(default = "default_scan_length_distribution")]
    pub scan_length_distribution: String,

    /// Whether records are inserted in key order (`"ordered"`) or with scrambled key numbers
    /// (`"hashed"`). Default: `"hashed"`.
    #[serde(default = "default_insert_order")]
    pub insert_order: String,

    /// The key number the load-phase insert sequence starts from. Default: 0.
    #[serde(default)]
    pub insert_start: u64,

    /// The prefix prepended to each key number to form the store key. Default: `"user"`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// The number of records loaded before the run phase starts.
    pub record_count: u64,

    /// The planned total number of run-phase operations, used to predict key space growth for
    /// the zipfian request distribution.
    pub operation_count: u64,
}

/// The workload engine.
///
/// Immutable after initialization except for the zipfian resize bookkeeping, which is why the
/// transaction path takes `&mut self`. Each worker thread owns a clone; the clones share the
/// two atomic key sequences so inserts allocate from one monotonic key space regardless of
/// which thread or phase performs them.
#[derive(Clone, Debug)]
pub struct CoreWorkload {
    field_count: u64,
    value_length: usize,
    key_prefix: String,
    ordered_inserts: bool,
    read_all_fields: bool,
    /// Logical key numbers for load-phase inserts.
    key_sequence: Arc<Counter>,
    /// Logical key numbers for run-phase sets; its high-water value bounds read selection.
    txn_insert_sequence: Arc<Counter>,
    operation_chooser: Discrete<OperationKind>,
    key_chooser: KeyChooser,
    field_chooser: Uniform,
    scan_length: ScanLength,
}

impl CoreWorkload {
    /// Initialize the engine from a parsed property set. Called once before any worker starts.
    pub fn new(opt: &WorkloadOpt) -> Result<Self, Error> {
        if opt.record_count == 0 {
            return Err(Error::Config("record_count should be positive".to_string()));
        }
        if opt.field_count == 0 {
            return Err(Error::Config("field_count should be positive".to_string()));
        }
        if opt.max_scan_length == 0 {
            return Err(Error::Config(
                "max_scan_length should be positive".to_string(),
            ));
        }
        if opt.get_proportion < 0.0 || opt.set_proportion < 0.0 {
            return Err(Error::Config(
                "operation proportions should not be negative".to_string(),
            ));
        }

        let mut operation_chooser = Discrete::new();
        if opt.get_proportion > 0.0 {
            operation_chooser.add(opt.get_proportion, OperationKind::Get);
        }
        if opt.set_proportion > 0.0 {
            operation_chooser.add(opt.set_proportion, OperationKind::Set);
        }

        let key_sequence = Arc::new(Counter::new(opt.insert_start));
        let txn_insert_sequence = Arc::new(Counter::new(opt.record_count));

        let key_chooser = match opt.request_distribution.as_str() {
            "uniform" => KeyChooser::Uniform(Uniform::new(0, opt.record_count - 1)),
            "zipfian" => {
                // The number of popular keys must not shift while the run inserts new records,
                // so the generator is built over a key space larger than what exists at the
                // start: the predicted number of new keys, padded by a fudge factor of 2 in
                // case more inserts happen than expected. Keys drawn beyond the current
                // high-water value are simply re-drawn.
                let expected_new_keys =
                    (opt.operation_count as f64 * opt.set_proportion * 2.0) as u64;
                KeyChooser::ScrambledZipfian(ScrambledZipfian::new(
                    opt.record_count + expected_new_keys,
                ))
            }
            "latest" => KeyChooser::SkewedLatest(SkewedLatest::new(txn_insert_sequence.clone())),
            d => {
                return Err(Error::Config(format!("unknown request distribution \"{d}\"")));
            }
        };

        let scan_length = match opt.scan_length_distribution.as_str() {
            "uniform" => ScanLength::Uniform(Uniform::new(1, opt.max_scan_length)),
            "zipfian" => ScanLength::Zipfian(Zipfian::new(1, opt.max_scan_length, ZIPFIAN_CONSTANT)),
            d => {
                return Err(Error::Config(format!(
                    "distribution \"{d}\" not allowed for scan length"
                )));
            }
        };

        // anything other than "hashed" inserts in key order
        let ordered_inserts = opt.insert_order != "hashed";

        debug!(
            "workload initialized for table {} with {} records",
            opt.table, opt.record_count
        );

        Ok(Self {
            field_count: opt.field_count,
            value_length: opt.value_length,
            key_prefix: opt.key_prefix.clone(),
            ordered_inserts,
            read_all_fields: opt.read_all_fields,
            key_sequence,
            txn_insert_sequence,
            operation_chooser,
            key_chooser,
            field_chooser: Uniform::new(0, opt.field_count - 1),
            scan_length,
        })
    }

    /// Initialize the engine from a TOML string, with environment variables taking precedence
    /// over the file content.
    pub fn new_from_toml_str(text: &str) -> Result<Self, Error> {
        let opt: WorkloadOpt = Figment::new()
            .merge(Toml::string(text))
            .merge(Env::raw())
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        Self::new(&opt)
    }

    /// The weights of the operation chooser in insertion order. Deterministic for a given
    /// configuration input.
    pub fn operation_weights(&self) -> Vec<f64> {
        self.operation_chooser.weights()
    }

    /// Draw a scan length from the configured distribution. The get/set transaction mix never
    /// issues scans itself; scan-capable drivers use this to size their range queries.
    pub fn next_scan_length(&self, rng: &mut impl Rng) -> u64 {
        match &self.scan_length {
            ScanLength::Uniform(g) => g.next(rng),
            ScanLength::Zipfian(g) => g.next(rng),
        }
    }

    fn build_key(&self, keynum: u64) -> String {
        let keynum = if self.ordered_inserts {
            keynum
        } else {
            fnv1a_64(keynum)
        };
        format!("{}{}", self.key_prefix, keynum)
    }

    fn build_value(&self, rng: &mut impl Rng) -> Vec<u8> {
        (&mut *rng)
            .sample_iter(Alphanumeric)
            .take(self.value_length)
            .collect()
    }

    /// Draw a record key number for a read, retrying until the number refers to a key that has
    /// been allocated for insertion. Under concurrent inserts the store may still not have the
    /// record visible by the time the get arrives; that race is benign and the resulting "not
    /// found" is not an engine error.
    fn next_keynum(&mut self, rng: &mut impl Rng) -> u64 {
        loop {
            let keynum = match &mut self.key_chooser {
                KeyChooser::Uniform(g) => g.next(rng),
                KeyChooser::ScrambledZipfian(g) => g.next(rng),
                KeyChooser::SkewedLatest(g) => g.next(rng),
            };
            if keynum <= self.txn_insert_sequence.last() {
                return keynum;
            }
        }
    }

    /// Do one insert operation. Called concurrently from multiple worker threads during the
    /// load phase; the only shared mutable state is the atomic key sequence, whose number is
    /// consumed even if the store call fails. Returns whether the store accepted the record;
    /// retry policy belongs to the caller.
    pub fn do_insert(&self, handle: &mut dyn KVStoreHandle, rng: &mut impl Rng) -> bool {
        let keynum = self.key_sequence.next();
        let key = self.build_key(keynum);
        let value = self.build_value(rng);
        match handle.put(&key, &value) {
            Ok(()) => true,
            Err(e) => {
                warn!("insert of key {} failed: {}", key, e);
                false
            }
        }
    }

    /// Do one transaction operation: draw an operation kind and dispatch it. Returns `Ok(true)`
    /// once the operation has been dispatched; store-level success or failure is reported
    /// through the store's own contract and not reinterpreted here. Fails only with
    /// [`Error::EmptyDistribution`] when no operation has a positive proportion, which callers
    /// must treat as fatal.
    pub fn do_transaction(
        &mut self,
        handle: &mut dyn KVStoreHandle,
        rng: &mut impl Rng,
    ) -> Result<bool, Error> {
        match self.operation_chooser.next(rng)? {
            OperationKind::Get => self.transaction_get(handle, rng),
            OperationKind::Set => self.transaction_set(handle, rng),
        }
        Ok(true)
    }

    fn transaction_get(&mut self, handle: &mut dyn KVStoreHandle, rng: &mut impl Rng) {
        let keynum = self.next_keynum(rng);
        let key = self.build_key(keynum);
        let fields = if self.read_all_fields {
            None
        } else {
            Some(vec![format!("field{}", self.field_chooser.next(rng))])
        };
        if let Err(e) = handle.get(&key, fields.as_deref()) {
            warn!("get of key {} failed: {}", key, e);
        }
    }

    fn transaction_set(&mut self, handle: &mut dyn KVStoreHandle, rng: &mut impl Rng) {
        // run-phase sets continue the monotonic key space started by the load phase
        let keynum = self.txn_insert_sequence.next();
        let key = self.build_key(keynum);
        let value = self.build_value(rng);
        if let Err(e) = handle.put(&key, &value) {
            warn!("set of key {} failed: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use hashbrown::HashMap;

    fn opt_from_str(text: &str) -> WorkloadOpt {
        Figment::new()
            .merge(Toml::string(text))
            .extract()
            .unwrap()
    }

    /// A store handle that records what the engine asked for, keyed by the raw store key.
    #[derive(Default)]
    struct Recorder {
        puts: Vec<String>,
        gets: Vec<String>,
        fail_puts: bool,
    }

    impl KVStoreHandle for Recorder {
        fn put(&mut self, key: &str, _value: &[u8]) -> Result<(), StoreError> {
            if self.fail_puts {
                return Err(StoreError("injected".to_string()));
            }
            self.puts.push(key.to_string());
            Ok(())
        }

        fn get(
            &mut self,
            key: &str,
            _fields: Option<&[String]>,
        ) -> Result<Option<Box<[u8]>>, StoreError> {
            self.gets.push(key.to_string());
            Ok(None)
        }
    }

    fn keynum(key: &str) -> u64 {
        key.strip_prefix("user").unwrap().parse().unwrap()
    }

    #[test]
    fn defaults_applied() {
        let w = CoreWorkload::new_from_toml_str(
            r#"record_count = 1000
               operation_count = 1000"#,
        )
        .unwrap();
        assert_eq!(w.field_count, 10);
        assert_eq!(w.value_length, 256);
        assert_eq!(w.key_prefix, "user");
        assert!(!w.ordered_inserts);
        assert_eq!(w.operation_weights(), vec![0.95, 0.05]);
    }

    #[test]
    fn unknown_request_distribution_rejected() {
        let opt = opt_from_str(
            r#"request_distribution = "gaussian"
               record_count = 1000
               operation_count = 1000"#,
        );
        assert!(matches!(CoreWorkload::new(&opt), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_scan_length_distribution_rejected() {
        let opt = opt_from_str(
            r#"scan_length_distribution = "latest"
               record_count = 1000
               operation_count = 1000"#,
        );
        assert!(matches!(CoreWorkload::new(&opt), Err(Error::Config(_))));
    }

    #[test]
    fn zero_record_count_rejected() {
        let opt = opt_from_str(
            r#"record_count = 0
               operation_count = 1000"#,
        );
        assert!(matches!(CoreWorkload::new(&opt), Err(Error::Config(_))));
    }

    #[test]
    fn empty_mix_fatal_on_first_transaction() {
        let opt = opt_from_str(
            r#"get_proportion = 0.0
               set_proportion = 0.0
               record_count = 1000
               operation_count = 1000"#,
        );
        let mut w = CoreWorkload::new(&opt).unwrap();
        let mut handle = Recorder::default();
        let mut rng = rand::rng();
        assert!(matches!(
            w.do_transaction(&mut handle, &mut rng),
            Err(Error::EmptyDistribution)
        ));
    }

    #[test]
    fn init_is_deterministic() {
        let text = r#"get_proportion = 0.7
                      set_proportion = 0.3
                      record_count = 1000
                      operation_count = 1000"#;
        let a = CoreWorkload::new(&opt_from_str(text)).unwrap();
        let b = CoreWorkload::new(&opt_from_str(text)).unwrap();
        assert_eq!(a.operation_weights(), b.operation_weights());
    }

    #[test]
    fn insert_keys_ordered() {
        let opt = opt_from_str(
            r#"insert_order = "ordered"
               value_length = 10
               record_count = 10
               operation_count = 10"#,
        );
        let w = CoreWorkload::new(&opt).unwrap();
        let mut handle = Recorder::default();
        let mut rng = rand::rng();
        for _ in 0..10 {
            assert!(w.do_insert(&mut handle, &mut rng));
        }
        let nums: Vec<u64> = handle.puts.iter().map(|k| keynum(k)).collect();
        assert_eq!(nums, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn insert_keys_hashed_distinct_and_non_sequential() {
        let opt = opt_from_str(
            r#"insert_order = "hashed"
               value_length = 10
               record_count = 10
               operation_count = 10"#,
        );
        let w = CoreWorkload::new(&opt).unwrap();
        let mut handle = Recorder::default();
        let mut rng = rand::rng();
        for _ in 0..10 {
            assert!(w.do_insert(&mut handle, &mut rng));
        }
        let nums: Vec<u64> = handle.puts.iter().map(|k| keynum(k)).collect();
        let distinct: HashMap<u64, ()> = nums.iter().map(|n| (*n, ())).collect();
        assert_eq!(distinct.len(), 10);
        assert!(nums.windows(2).any(|w| w[1] != w[0] + 1));
    }

    #[test]
    fn insert_failure_still_consumes_key_number() {
        let opt = opt_from_str(
            r#"insert_order = "ordered"
               value_length = 10
               record_count = 10
               operation_count = 10"#,
        );
        let w = CoreWorkload::new(&opt).unwrap();
        let mut rng = rand::rng();
        let mut failing = Recorder {
            fail_puts: true,
            ..Recorder::default()
        };
        assert!(!w.do_insert(&mut failing, &mut rng));
        let mut handle = Recorder::default();
        assert!(w.do_insert(&mut handle, &mut rng));
        // key 0 was consumed by the failed insert
        assert_eq!(keynum(&handle.puts[0]), 1);
    }

    #[test]
    fn value_length_respected() {
        let opt = opt_from_str(
            r#"value_length = 100
               record_count = 10
               operation_count = 10"#,
        );
        let w = CoreWorkload::new(&opt).unwrap();
        let mut rng = rand::rng();
        assert_eq!(w.build_value(&mut rng).len(), 100);
    }

    #[test]
    fn single_field_reads_name_a_field() {
        let opt = opt_from_str(
            r#"read_all_fields = false
               field_count = 4
               insert_order = "ordered"
               record_count = 10
               operation_count = 10"#,
        );
        struct FieldCheck;
        impl KVStoreHandle for FieldCheck {
            fn put(&mut self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
                Ok(())
            }
            fn get(
                &mut self,
                _key: &str,
                fields: Option<&[String]>,
            ) -> Result<Option<Box<[u8]>>, StoreError> {
                let fields = fields.expect("single-field reads should name a field");
                assert_eq!(fields.len(), 1);
                assert!(fields[0].starts_with("field"));
                let n: u64 = fields[0].strip_prefix("field").unwrap().parse().unwrap();
                assert!(n < 4);
                Ok(None)
            }
        }
        let mut w = CoreWorkload::new(&opt).unwrap();
        let mut handle = FieldCheck;
        let mut rng = rand::rng();
        for _ in 0..100 {
            w.transaction_get(&mut handle, &mut rng);
        }
    }

    #[test]
    fn scan_length_bounded() {
        let opt = opt_from_str(
            r#"max_scan_length = 50
               scan_length_distribution = "zipfian"
               record_count = 10
               operation_count = 10"#,
        );
        let w = CoreWorkload::new(&opt).unwrap();
        let mut rng = rand::rng();
        for _ in 0..10000 {
            let n = w.next_scan_length(&mut rng);
            assert!(n >= 1 && n <= 50);
        }
    }

    #[test]
    fn read_keys_never_pass_high_water() {
        let opt = opt_from_str(
            r#"request_distribution = "zipfian"
               insert_order = "ordered"
               set_proportion = 0.5
               get_proportion = 0.5
               record_count = 100
               operation_count = 10000"#,
        );
        let mut w = CoreWorkload::new(&opt).unwrap();
        let mut rng = rand::rng();
        for _ in 0..10000 {
            let keynum = w.next_keynum(&mut rng);
            assert!(keynum <= w.txn_insert_sequence.last());
        }
    }

    #[test]
    fn latest_distribution_tracks_inserts() {
        let opt = opt_from_str(
            r#"request_distribution = "latest"
               insert_order = "ordered"
               record_count = 100
               operation_count = 1000"#,
        );
        let mut w = CoreWorkload::new(&opt).unwrap();
        let mut handle = Recorder::default();
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let keynum = w.next_keynum(&mut rng);
            assert!(keynum <= 99);
        }
        // new sets advance the high-water mark and with it the sampling range
        for _ in 0..100 {
            w.transaction_set(&mut handle, &mut rng);
        }
        let mut max = 0;
        for _ in 0..10000 {
            max = max.max(w.next_keynum(&mut rng));
        }
        assert!(max > 99 && max <= 199, "max keynum: {}", max);
    }

    #[test]
    fn uniform_get_set_scenario() {
        // fieldcount 10, valuelength 100, 95/5 get/set, uniform keys over 1000 records
        let opt = opt_from_str(
            r#"field_count = 10
               value_length = 100
               get_proportion = 0.95
               set_proportion = 0.05
               request_distribution = "uniform"
               insert_order = "ordered"
               record_count = 1000
               operation_count = 10000"#,
        );
        let mut w = CoreWorkload::new(&opt).unwrap();
        let mut handle = Recorder::default();
        let mut rng = rand::rng();
        for _ in 0..10000 {
            assert!(w.do_transaction(&mut handle, &mut rng).unwrap());
        }
        let gets = handle.gets.len() as i64;
        let sets = handle.puts.len() as i64;
        assert_eq!(gets + sets, 10000);
        // within 1% of the configured 9500/500 split
        assert!((gets - 9500).abs() <= 100, "gets: {}", gets);
        assert!((sets - 500).abs() <= 100, "sets: {}", sets);
        for k in handle.gets.iter() {
            assert!(keynum(k) <= 999);
        }
        // run-phase sets continue the key space past the loaded records
        for k in handle.puts.iter() {
            assert!(keynum(k) >= 1000);
        }
    }

    #[test]
    fn clones_share_key_sequences() {
        let opt = opt_from_str(
            r#"insert_order = "ordered"
               record_count = 10
               operation_count = 10"#,
        );
        let w1 = CoreWorkload::new(&opt).unwrap();
        let w2 = w1.clone();
        let mut handle = Recorder::default();
        let mut rng = rand::rng();
        assert!(w1.do_insert(&mut handle, &mut rng));
        assert!(w2.do_insert(&mut handle, &mut rng));
        let nums: Vec<u64> = handle.puts.iter().map(|k| keynum(k)).collect();
        assert_eq!(nums, vec![0, 1]);
    }
}
