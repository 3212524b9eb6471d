//! The benchmark driver that exhausts a workload's operation budget.
//!
//! A benchmark consists of two phases run back to back against the same store:
//!
//! - **load**: `record_count` inserts, split across all worker threads, each going through
//!   [`CoreWorkload::do_insert`].
//! - **run**: `operation_count` mixed transactions, split likewise, each going through
//!   [`CoreWorkload::do_transaction`].
//!
//! ## Configuration Format
//!
//! A benchmark configuration file is formatted in TOML. It contains a `[store]` section naming
//! a registered store plus its parameters, driver options, and the flattened workload
//! properties of [`WorkloadOpt`]:
//!
//! ```toml
//! threads = 4
//! latency = true
//!
//! get_proportion = 0.95
//! set_proportion = 0.05
//! request_distribution = "zipfian"
//! record_count = 100000
//! operation_count = 1000000
//!
//! [store]
//! name = "mutex_hashmap"
//! shards = 512
//! ```
//!
//! Options can be overwritten via environment variables without changing the file content.
//!
//! ## Output Format
//!
//! All output is plain text, one line per phase, easy to process with shell tools:
//!
//! ```txt
//! phase load threads 4 duration 0.52 total 100000 mops 0.19
//! phase run threads 4 duration 4.01 total 1000000 mops 0.25
//! ```
//!
//! When `latency` is `true` the run line carries extra columns (all units microseconds):
//!
//! ```txt
//! ... mops 0.25 min_us 0.05 max_us 103.42 avg_us 3.21 p50_us 2.98 p95_us 6.40 p99_us 9.83 p999_us 30.21
//! ```

use crate::stores::{self, StoreOpt};
use crate::workload::{CoreWorkload, WorkloadOpt};
use crate::{Error, KVStore};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use hdrhistogram::Histogram;
use log::{debug, warn};
use quanta::Instant;
use serde::Deserialize;
use std::fmt::Write;
use std::sync::{Arc, Barrier};

/// The configuration of a benchmark deserialized from a TOML string.
#[derive(Deserialize, Clone, Debug)]
pub struct BenchmarkOpt {
    /// Number of worker threads in both phases.
    ///
    /// Default: 1.
    pub threads: Option<usize>,

    /// Whether to record per-operation latency. Measuring time costs extra, so enabling this
    /// usually lowers the throughput numbers.
    ///
    /// Default: false.
    pub latency: Option<bool>,

    /// The store under test.
    pub store: StoreOpt,

    /// The definition of the workload.
    ///
    /// This section is embedded and flattened, so the options of [`WorkloadOpt`] are given
    /// directly at the top level.
    #[serde(flatten)]
    pub workload: WorkloadOpt,
}

/// A benchmark parsed from user input, ready to run.
pub struct Benchmark {
    threads: usize,
    latency: bool,
    record_count: u64,
    operation_count: u64,
    workload: CoreWorkload,
}

impl Benchmark {
    fn new(opt: &BenchmarkOpt) -> Result<Self, Error> {
        let threads = opt.threads.unwrap_or(1);
        if threads == 0 {
            return Err(Error::Config("threads should be positive".to_string()));
        }
        let workload = CoreWorkload::new(&opt.workload)?;
        Ok(Self {
            threads,
            latency: opt.latency.unwrap_or(false),
            record_count: opt.workload.record_count,
            operation_count: opt.workload.operation_count,
            workload,
        })
    }
}

/// Parse a benchmark configuration string and construct the store and the benchmark, with
/// environment variables taking precedence over the file content.
pub fn init(text: &str) -> Result<(Box<dyn KVStore>, Benchmark), Error> {
    let opt: BenchmarkOpt = Figment::new()
        .merge(Toml::string(text))
        .merge(Env::raw())
        .extract()
        .map_err(|e| Error::Config(e.to_string()))?;
    debug!("creating benchmark with configuration: {:?}", opt);
    let store = stores::create(&opt.store)?;
    let benchmark = Benchmark::new(&opt)?;
    Ok((store, benchmark))
}

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Load,
    Run,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Run => "run",
        }
    }
}

struct WorkerReport {
    ops: u64,
    failed: u64,
    hdr: Option<Histogram<u64>>,
}

fn pin_thread(id: usize) {
    if let Some(cores) = core_affinity::get_core_ids() {
        core_affinity::set_for_current(cores[id % cores.len()]);
    }
}

fn bench_worker(
    store: Arc<Box<dyn KVStore>>,
    mut workload: CoreWorkload,
    phase: Phase,
    ops: u64,
    latency: bool,
    id: usize,
    barrier: Arc<Barrier>,
) -> Result<WorkerReport, Error> {
    pin_thread(id);
    let mut handle = store.handle();
    let mut rng = rand::rng();
    let mut hdr = match latency {
        true => Some(Histogram::<u64>::new(3).expect("histogram construction")),
        false => None,
    };
    let mut failed = 0u64;

    // start the phase on all workers at roughly the same time
    barrier.wait();
    for _ in 0..ops {
        let op_start = hdr.as_ref().map(|_| Instant::now());
        match phase {
            Phase::Load => {
                if !workload.do_insert(&mut *handle, &mut rng) {
                    failed += 1;
                }
            }
            Phase::Run => {
                workload.do_transaction(&mut *handle, &mut rng)?;
            }
        }
        if let Some(h) = hdr.as_mut() {
            let ns = op_start.unwrap().elapsed().as_nanos() as u64;
            assert!(h.record(ns).is_ok());
        }
    }
    Ok(WorkerReport { ops, failed, hdr })
}

fn bench_phase(
    store: &Arc<Box<dyn KVStore>>,
    benchmark: &Benchmark,
    phase: Phase,
    report: &mut String,
) -> Result<(), Error> {
    let nr_threads = benchmark.threads;
    let total_ops = match phase {
        Phase::Load => benchmark.record_count,
        Phase::Run => benchmark.operation_count,
    };
    let barrier = Arc::new(Barrier::new(nr_threads + 1));

    let mut workers = Vec::with_capacity(nr_threads);
    for id in 0..nr_threads {
        // spread the budget, with the remainder going to the lowest-numbered workers
        let ops = total_ops / nr_threads as u64 + u64::from((id as u64) < total_ops % nr_threads as u64);
        let store = store.clone();
        let workload = benchmark.workload.clone();
        let latency = benchmark.latency;
        let barrier = barrier.clone();
        workers.push(std::thread::spawn(move || {
            bench_worker(store, workload, phase, ops, latency, id, barrier)
        }));
    }

    barrier.wait();
    let start = Instant::now();
    let mut total = 0u64;
    let mut failed = 0u64;
    let mut hdr: Option<Histogram<u64>> = None;
    for w in workers {
        let r = w.join().expect("worker thread should not panic")?;
        total += r.ops;
        failed += r.failed;
        match (hdr.as_mut(), r.hdr) {
            (Some(h), Some(other)) => assert!(h.add(&other).is_ok()),
            (None, Some(other)) => hdr = Some(other),
            _ => (),
        }
    }
    let duration = start.elapsed();

    if failed > 0 {
        warn!("{} store calls failed during {} phase", failed, phase.name());
    }

    let mut line = format!(
        "phase {} threads {} duration {:.2} total {} mops {:.2}",
        phase.name(),
        nr_threads,
        duration.as_secs_f64(),
        total,
        total as f64 / duration.as_secs_f64() / 1_000_000.0,
    );
    if let Some(h) = hdr {
        write!(
            line,
            " min_us {:.2} max_us {:.2} avg_us {:.2} \
             p50_us {:.2} p95_us {:.2} p99_us {:.2} p999_us {:.2}",
            h.min() as f64 / 1000.0,
            h.max() as f64 / 1000.0,
            h.mean() / 1000.0,
            h.value_at_quantile(0.50) as f64 / 1000.0,
            h.value_at_quantile(0.95) as f64 / 1000.0,
            h.value_at_quantile(0.99) as f64 / 1000.0,
            h.value_at_quantile(0.999) as f64 / 1000.0,
        )
        .expect("write to string");
    }
    println!("{}", line);
    report.push_str(&line);
    report.push('\n');
    Ok(())
}

/// Run the load and run phases against a store, printing one report line per phase and
/// returning the full report.
pub fn run(store: Box<dyn KVStore>, benchmark: &Benchmark) -> Result<String, Error> {
    let store = Arc::new(store);
    let mut report = String::new();
    bench_phase(&store, benchmark, Phase::Load, &mut report)?;
    bench_phase(&store, benchmark, Phase::Run, &mut report)?;
    Ok(report)
}

/// Parse a benchmark configuration string, then run it. See [`init`] and [`run`].
pub fn run_from_str(text: &str) -> Result<String, Error> {
    let (store, benchmark) = init(text)?;
    run(store, &benchmark)
}
