//! Random number generators that drive the synthetic workload.
//!
//! This module contains the building blocks composed by [`crate::workload`]:
//!
//! - [`Counter`]: an atomic monotonic sequence for insert key numbering.
//! - [`Discrete`]: weighted random selection over a small set of operation tags.
//! - [`Uniform`], [`Zipfian`], [`ScrambledZipfian`], [`SkewedLatest`]: key number samplers.
//! - [`fnv1a_64`]: the deterministic integer scrambling used for hashed insert order.
//!
//! All samplers produce logical record key numbers, not store keys. They take the random source
//! as an argument so each worker thread can use its own thread-local generator.

use crate::Error;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The default skew of the zipfian samplers.
pub const ZIPFIAN_CONSTANT: f64 = 0.99;

const FNV_OFFSET_BASIS_64: u64 = 0xcbf29ce484222325;
const FNV_PRIME_64: u64 = 0x100000001b3;

/// Scramble a 64-bit integer with FNV-1a over its little-endian octets.
///
/// Deterministic and collision-rare over practical key ranges, which is all that hashed insert
/// order needs. Not invertible and not cryptographic.
pub fn fnv1a_64(val: u64) -> u64 {
    let mut v = val;
    let mut hash = FNV_OFFSET_BASIS_64;
    for _ in 0..8 {
        let octet = v & 0xff;
        v >>= 8;
        hash ^= octet;
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// A thread-safe monotonically increasing sequence.
///
/// One shared instance seeds the logical key numbers of all concurrent inserters, so each
/// number is handed out exactly once. The current value doubles as the high-water mark that
/// read selection consults via [`Counter::last`].
#[derive(Debug)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    /// Allocate and return the next number in the sequence. The number is considered consumed
    /// even if whatever it is used for fails afterwards.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// The last number that was allocated, i.e., the high-water key. Before the first
    /// allocation this saturates at the start offset rather than wrapping.
    pub fn last(&self) -> u64 {
        self.0.load(Ordering::Relaxed).saturating_sub(1)
    }
}

/// Weighted random selection over a small append-only set of tags.
///
/// Each entry is selected with probability `weight / total`. The entry set is built once at
/// initialization time and is deterministic given the same inputs.
#[derive(Clone, Debug)]
pub struct Discrete<T> {
    entries: Vec<(f64, T)>,
    total: f64,
}

impl<T: Copy> Discrete<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            total: 0.0,
        }
    }

    /// Append one tag with the given weight. A weight of zero is a no-op so the entry can
    /// never be drawn; negative weights are rejected.
    pub fn add(&mut self, weight: f64, tag: T) {
        assert!(weight >= 0.0, "weight should not be negative");
        if weight == 0.0 {
            return;
        }
        self.entries.push((weight, tag));
        self.total += weight;
    }

    /// Draw one tag. Fails with [`Error::EmptyDistribution`] if no entries were ever added;
    /// callers must treat that as a fatal configuration error, not retried.
    pub fn next(&self, rng: &mut impl Rng) -> Result<T, Error> {
        if self.entries.is_empty() {
            return Err(Error::EmptyDistribution);
        }
        let mut draw = rng.random::<f64>() * self.total;
        for (weight, tag) in self.entries.iter() {
            if draw < *weight {
                return Ok(*tag);
            }
            draw -= *weight;
        }
        // rounding may leave a tiny remainder behind the last entry
        Ok(self.entries[self.entries.len() - 1].1)
    }

    /// The weights of all entries in insertion order.
    pub fn weights(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.0).collect()
    }
}

impl<T: Copy> Default for Discrete<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniformly random integers in `[min, max]`, both inclusive. Each draw is independent.
#[derive(Clone, Debug)]
pub struct Uniform {
    min: u64,
    max: u64,
}

impl Uniform {
    pub fn new(min: u64, max: u64) -> Self {
        assert!(max >= min, "max should not be less than min");
        Self { min, max }
    }

    pub fn next(&self, rng: &mut impl Rng) -> u64 {
        rng.random_range(self.min..=self.max)
    }
}

fn zeta(st: u64, n: u64, theta: f64, initial: f64) -> f64 {
    let mut sum = initial;
    for i in st..n {
        sum += 1.0 / ((i + 1) as f64).powf(theta);
    }
    sum
}

/// Zipfian-distributed integers in `[min, max]`.
///
/// Probability mass is proportional to `1 / rank^theta` with the lowest number being the most
/// popular. The normalization constant (the generalized harmonic sum over the range) is
/// precomputed once at construction, which makes construction linear in the number of items;
/// draws are constant time.
///
/// The item count can only grow, and only through the explicit [`Zipfian::resize`] call which
/// extends the harmonic sum incrementally. Nothing mutates mid-draw.
#[derive(Clone, Debug)]
pub struct Zipfian {
    base: u64,
    items: u64,
    theta: f64,
    alpha: f64,
    zeta2theta: f64,
    zetan: f64,
    eta: f64,
    /// The item count that `zetan` currently covers.
    count_for_zeta: u64,
}

impl Zipfian {
    pub fn new(min: u64, max: u64, theta: f64) -> Self {
        assert!(max >= min, "max should not be less than min");
        let items = max - min + 1;
        let zeta2theta = zeta(0, 2, theta, 0.0);
        let zetan = zeta(0, items, theta, 0.0);
        let mut this = Self {
            base: min,
            items,
            theta,
            alpha: 1.0 / (1.0 - theta),
            zeta2theta,
            zetan,
            eta: 0.0,
            count_for_zeta: items,
        };
        this.eta = this.compute_eta();
        this
    }

    fn compute_eta(&self) -> f64 {
        (1.0 - (2.0 / self.items as f64).powf(1.0 - self.theta))
            / (1.0 - self.zeta2theta / self.zetan)
    }

    /// Grow the generator to cover `items` elements, re-deriving the normalization constant
    /// incrementally from the part already computed. Shrinking is not supported; a smaller or
    /// equal item count leaves the generator untouched.
    pub fn resize(&mut self, items: u64) {
        if items <= self.count_for_zeta {
            return;
        }
        self.zetan = zeta(self.count_for_zeta, items, self.theta, self.zetan);
        self.count_for_zeta = items;
        self.items = items;
        self.eta = self.compute_eta();
    }

    /// Draw the next number. This is the rejection-free inverse transform over the precomputed
    /// harmonic sum, with the two most popular ranks special-cased.
    pub fn next(&self, rng: &mut impl Rng) -> u64 {
        let u: f64 = rng.random();
        let uz = u * self.zetan;
        if uz < 1.0 {
            return self.base;
        }
        if uz < 1.0 + 0.5f64.powf(self.theta) {
            return self.base + 1;
        }
        let spread = (self.items as f64) * (self.eta * u - self.eta + 1.0).powf(self.alpha);
        self.base + (spread as u64).min(self.items - 1)
    }
}

/// Zipfian-popular numbers in `[0, items - 1]` spread across the whole range by [`fnv1a_64`].
///
/// A plain zipfian concentrates its mass on the lowest numbers, which would hammer a physically
/// contiguous range of the store under test. Scrambling each draw keeps the popularity skew but
/// relocates the hot set pseudo-randomly.
#[derive(Clone, Debug)]
pub struct ScrambledZipfian {
    items: u64,
    zipfian: Zipfian,
}

impl ScrambledZipfian {
    pub fn new(items: u64) -> Self {
        assert!(items > 0, "items should be positive");
        Self {
            items,
            zipfian: Zipfian::new(0, items - 1, ZIPFIAN_CONSTANT),
        }
    }

    pub fn next(&self, rng: &mut impl Rng) -> u64 {
        fnv1a_64(self.zipfian.next(rng)) % self.items
    }
}

/// Integers biased towards the most recently allocated numbers of a shared [`Counter`].
///
/// Each draw reads the counter's high-water value and returns `latest - zipfian_draw` clipped
/// to zero, so the sampling range grows automatically as concurrent inserts advance the basis.
/// The only state owned here is the inner zipfian's resize bookkeeping.
#[derive(Debug)]
pub struct SkewedLatest {
    basis: Arc<Counter>,
    zipfian: Zipfian,
}

impl SkewedLatest {
    pub fn new(basis: Arc<Counter>) -> Self {
        let zipfian = Zipfian::new(0, basis.last(), ZIPFIAN_CONSTANT);
        Self { basis, zipfian }
    }

    /// Draw the next number. Never exceeds the basis' current high-water value.
    pub fn next(&mut self, rng: &mut impl Rng) -> u64 {
        let latest = self.basis.last();
        self.zipfian.resize(latest + 1);
        latest - self.zipfian.next(rng).min(latest)
    }
}

impl Clone for SkewedLatest {
    fn clone(&self) -> Self {
        // clones share the basis but own their zipfian state
        Self {
            basis: self.basis.clone(),
            zipfian: self.zipfian.clone(),
        }
    }
}
