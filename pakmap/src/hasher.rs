//! Stable hashing and bucket assignment
//!
//! The same hasher must be used to build and to read an archive: bucket ids
//! are computed from entry names on both sides and never stored.

use xxhash_rust::xxh3::xxh3_64;

/// Desired ratio of items to buckets when none is given.
pub const DEFAULT_LOAD_FACTOR: f64 = 0.75;

/// Stable hashing plus bucket arithmetic. Implementations must be pure:
/// equal inputs give equal outputs across processes and platforms.
pub trait Hasher {
    /// 64-bit hash of `bytes`, stable across runs.
    fn hash(&self, bytes: &[u8]) -> u64;

    /// Desired bucket-table length for an expected `items` count. At least 1.
    fn buckets_for(&self, items: usize) -> usize;

    /// Maps `hash` into `[0, bucket_count)`.
    fn bucket_of(&self, hash: u64, bucket_count: usize) -> usize;
}

impl<H: Hasher + ?Sized> Hasher for Box<H> {
    fn hash(&self, bytes: &[u8]) -> u64 {
        (**self).hash(bytes)
    }

    fn buckets_for(&self, items: usize) -> usize {
        (**self).buckets_for(items)
    }

    fn bucket_of(&self, hash: u64, bucket_count: usize) -> usize {
        (**self).bucket_of(hash, bucket_count)
    }
}

/// Default hasher: XXH3-64 with a configurable load factor.
#[derive(Debug, Clone, Copy)]
pub struct Xxh3Hasher {
    load_factor: f64,
}

impl Xxh3Hasher {
    pub fn new(load_factor: f64) -> Self {
        Self { load_factor }
    }
}

impl Default for Xxh3Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_LOAD_FACTOR)
    }
}

impl Hasher for Xxh3Hasher {
    fn hash(&self, bytes: &[u8]) -> u64 {
        xxh3_64(bytes)
    }

    fn buckets_for(&self, items: usize) -> usize {
        ((items as f64 / self.load_factor).ceil() as usize).max(1)
    }

    fn bucket_of(&self, hash: u64, bucket_count: usize) -> usize {
        // Treat the hash as a fraction of [0, 1) and scale it onto the
        // table. f64 keeps this deterministic on every platform.
        let unit = hash as f64 / 2f64.powi(64);
        let slot = (unit * bucket_count as f64).round() as usize;
        slot.min(bucket_count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let hasher = Xxh3Hasher::default();
        assert_eq!(hasher.hash(b"file1.txt"), hasher.hash(b"file1.txt"));
        assert_ne!(hasher.hash(b"file1.txt"), hasher.hash(b"file2.txt"));
    }

    #[test]
    fn bucket_counts_round_up() {
        let hasher = Xxh3Hasher::default();
        assert_eq!(hasher.buckets_for(0), 1);
        assert_eq!(hasher.buckets_for(3), 4);
        assert_eq!(hasher.buckets_for(100), 134);
    }

    #[test]
    fn bucket_count_honours_load_factor() {
        let hasher = Xxh3Hasher::new(0.5);
        assert_eq!(hasher.buckets_for(10), 20);
        let hasher = Xxh3Hasher::new(2.0);
        assert_eq!(hasher.buckets_for(10), 5);
    }

    #[test]
    fn buckets_stay_in_range() {
        let hasher = Xxh3Hasher::default();
        for count in [1, 7, 134, 4096] {
            for name in ["a", "b/c.bin", "file42.txt", ""] {
                let bucket = hasher.bucket_of(hasher.hash(name.as_bytes()), count);
                assert!(bucket < count, "{name:?} mapped to {bucket} of {count}");
            }
            assert_eq!(hasher.bucket_of(u64::MAX, count), count - 1);
            assert_eq!(hasher.bucket_of(0, count), 0);
        }
    }
}
