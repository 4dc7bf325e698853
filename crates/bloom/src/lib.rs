//! # Bloom Filter
//!
//! Probabilistic set membership for SSTable keys.
//!
//! A negative answer is exact (the key was never inserted); a positive answer
//! may be wrong with a probability close to the rate the filter was sized for.
//!
//! ## Usage in the storage engine
//!
//! Every SSTable owns one filter populated with each key it stores. Filters
//! are never written to disk: reopening a table rescans its data and inserts
//! the same keys in the same order, and because hashing is fully
//! deterministic the rebuilt filter is bit-for-bit identical to the original.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.insert(b"apple");
//! assert!(bf.may_contain(b"apple"));
//! ```

const WORD_BITS: u64 = 64;

/// A bloom filter over a packed `u64` bit array with `k` probe positions per key.
///
/// Probe positions come from double hashing, `h1 + i * h2`, where both halves
/// are FNV-1a 64 with different offset bases.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    words: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    /// Number of `insert` calls, duplicates included.
    inserted: usize,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` keys at roughly
    /// `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n * ln(p) / ln(2)^2, k = (m / n) * ln(2)
        let n = expected_items as f64;
        let ln2 = std::f64::consts::LN_2;
        let m = (-n * false_positive_rate.ln() / (ln2 * ln2)).ceil() as u64;
        let num_bits = m.max(WORD_BITS);
        let num_hashes = (((num_bits as f64 / n) * ln2).round() as u32).max(1);

        let word_count = num_bits.div_ceil(WORD_BITS) as usize;

        Self {
            words: vec![0u64; word_count],
            num_bits,
            num_hashes,
            inserted: 0,
        }
    }

    /// Adds `key` to the set.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = self.probe(h1, h2, i);
            self.words[(bit / WORD_BITS) as usize] |= 1u64 << (bit % WORD_BITS);
        }
        self.inserted += 1;
    }

    /// Returns `false` only if `key` was definitely never inserted.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        (0..self.num_hashes).all(|i| {
            let bit = self.probe(h1, h2, i);
            self.words[(bit / WORD_BITS) as usize] & (1u64 << (bit % WORD_BITS)) != 0
        })
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Number of keys inserted so far (duplicates counted).
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Fraction of bits currently set. Useful for diagnostics; a filter
    /// approaching 1.0 has been overfilled relative to its sizing.
    #[must_use]
    pub fn fill_ratio(&self) -> f64 {
        let set: u64 = self.words.iter().map(|w| u64::from(w.count_ones())).sum();
        set as f64 / self.num_bits as f64
    }

    fn probe(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("inserted", &self.inserted)
            .finish()
    }
}

fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h1 = fnv1a_64(key, 0xcbf2_9ce4_8422_2325);
    // An even step would only ever reach half the bit positions when
    // `num_bits` is even.
    let h2 = fnv1a_64(key, 0x517c_c1b7_2722_0a95) | 1;
    (h1, h2)
}

fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter().fold(basis, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
