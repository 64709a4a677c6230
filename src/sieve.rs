//! # Sieve — Small-Prime Pool and Segmented Windows
//!
//! Primality infrastructure for the chunked verifier. Provides:
//!
//! 1. **Prime generation** via a wheel-30 sieve of Eratosthenes (26.7% memory
//!    of naive sieve; stores only residues coprime to {2, 3, 5}).
//! 2. **[`SmallPrimes`]**: the shared, read-only candidate pool. An ascending
//!    list of all primes below a ceiling plus a bit-packed presence table for
//!    O(1) complement lookups below that ceiling.
//! 3. **[`PrimeWindow`]**: a segmented sieve over an arbitrary inclusive window
//!    `[lo, hi]`, owned by exactly one worker for the lifetime of one chunk.
//! 4. **[`BitSieve`]**: the packed bitmap both of the above are built on.
//!
//! ## Algorithm: Segmented Sieve
//!
//! Every position of the window starts out marked prime; 0 and 1 are cleared
//! when they fall inside it. Each divisor `i` in `2..=isqrt(hi)` clears its
//! multiples from `max(i², ⌈lo/i⌉·i)` up to `hi`. Composite divisors are
//! harmless (their multiples are already multiples of a smaller prime), so
//! the window is correct in isolation; when a small-prime pool that covers
//! `isqrt(hi)` is supplied, composite divisors are skipped outright.
//!
//! Complexity: O((hi − lo) log log hi + √hi) time, O((hi − lo)/8) bytes.

use crate::config::MAX_RANGE_END;

/// Generate all primes up to `limit` (inclusive) using a wheel-30 sieve.
///
/// Uses a mod-30 wheel to store only numbers coprime to {2,3,5}, reducing
/// memory to 8/30 ≈ 26.7% of the naive sieve.
pub fn generate_primes(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return vec![];
    }
    if limit < 7 {
        return [2, 3, 5].iter().copied().filter(|&p| p <= limit).collect();
    }

    // Residues coprime to 30: these are the only positions we track
    const RESIDUES: [u8; 8] = [1, 7, 11, 13, 17, 19, 23, 29];

    // Map residue → index in the wheel (for residues coprime to 30)
    const RES_TO_IDX: [u8; 30] = [
        255, 0, 255, 255, 255, 255, 255, 1, 255, 255, 255, 2, 255, 3, 255, 255, 255, 4, 255, 5,
        255, 255, 255, 6, 255, 255, 255, 255, 255, 7,
    ];

    let limit = limit as usize;
    let num_segments = limit / 30 + 1;
    // One byte per 30 integers, one bit per residue
    let mut sieve = vec![0xFFu8; num_segments];

    let sqrt_limit = limit.isqrt() + 1;
    for seg in 0..num_segments {
        for &ri in &RESIDUES {
            let n = seg * 30 + ri as usize;
            if n < 7 || n > sqrt_limit {
                continue;
            }
            let idx = RES_TO_IDX[ri as usize] as usize;
            if sieve[seg] & (1 << idx) == 0 {
                continue;
            }
            let mut m = n * n;
            while m <= limit {
                let ms = m / 30;
                let mr = m % 30;
                if RES_TO_IDX[mr] != 255 {
                    sieve[ms] &= !(1 << RES_TO_IDX[mr]);
                }
                m += n;
            }
        }
    }

    let mut primes = Vec::with_capacity(estimate_prime_count(limit));
    primes.extend_from_slice(&[2, 3, 5]);

    for (seg, &byte) in sieve.iter().enumerate() {
        if byte == 0 {
            continue;
        }
        for (bit_idx, &r) in RESIDUES.iter().enumerate() {
            if byte & (1 << bit_idx) != 0 {
                let n = seg * 30 + r as usize;
                if n > 5 && n <= limit {
                    primes.push(n as u64);
                }
            }
        }
    }
    primes
}

/// All primes in `[2, ceiling)`, ascending.
pub fn primes_below(ceiling: u64) -> Vec<u64> {
    if ceiling <= 2 {
        return vec![];
    }
    generate_primes(ceiling - 1)
}

/// Estimate prime count up to n using the prime counting function approximation.
fn estimate_prime_count(n: usize) -> usize {
    if n < 10 {
        return 4;
    }
    let nf = n as f64;
    (1.3 * nf / nf.ln()) as usize
}

/// The shared pool of candidate witness primes.
///
/// Built once per run and shared by `Arc` across all workers; never mutated
/// after construction.
pub struct SmallPrimes {
    ceiling: u64,
    primes: Vec<u64>,
    table: BitSieve,
}

impl SmallPrimes {
    /// Sieve every prime below `ceiling`.
    pub fn new(ceiling: u64) -> Self {
        Self::from_primes(ceiling, primes_below(ceiling))
    }

    /// Build a pool from an explicit list. Entries at or above `ceiling` are
    /// dropped; the list is sorted and deduplicated. No primality check is
    /// performed, so a caller can hand in a deliberately incomplete pool.
    pub fn from_primes(ceiling: u64, mut primes: Vec<u64>) -> Self {
        primes.retain(|&p| p < ceiling);
        primes.sort_unstable();
        primes.dedup();
        let mut table = BitSieve::new_all_clear(ceiling as usize);
        for &p in &primes {
            table.set(p as usize);
        }
        SmallPrimes {
            ceiling,
            primes,
            table,
        }
    }

    /// Exclusive upper bound of the pool.
    #[inline]
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// The pool in ascending order.
    #[inline]
    pub fn primes(&self) -> &[u64] {
        &self.primes
    }

    pub fn len(&self) -> usize {
        self.primes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    /// Membership in the pool. Always false at or above the ceiling.
    #[inline]
    pub fn contains(&self, x: u64) -> bool {
        x < self.ceiling && self.table.get(x as usize)
    }

    /// Largest prime in the pool.
    pub fn largest(&self) -> Option<u64> {
        self.primes.last().copied()
    }
}

/// Primality of every integer in an inclusive window `[lo, hi]`.
pub struct PrimeWindow {
    lo: u64,
    hi: u64,
    bits: BitSieve,
}

impl PrimeWindow {
    /// Segmented sieve of `[lo, hi]`.
    ///
    /// `pool` is optional: when given, divisors below its ceiling that the
    /// pool knows to be composite are skipped. Every divisor at or above the
    /// ceiling is still applied, so an incomplete pool never makes the window
    /// wrong, only slower.
    ///
    /// # Panics
    /// Panics if `lo > hi` or `hi > MAX_RANGE_END`. The bitmap takes
    /// `(hi - lo) / 8` bytes, so callers bound the width as well.
    pub fn sieve(lo: u64, hi: u64, pool: Option<&SmallPrimes>) -> Self {
        assert!(lo <= hi, "empty sieve window [{}, {}]", lo, hi);
        assert!(
            hi <= MAX_RANGE_END,
            "sieve window end {} exceeds {}",
            hi,
            MAX_RANGE_END
        );
        let len = (hi - lo + 1) as usize;
        let mut bits = BitSieve::new_all_set(len);

        if lo == 0 {
            bits.clear(0);
        }
        if lo <= 1 && hi >= 1 {
            bits.clear((1 - lo) as usize);
        }

        let root = hi.isqrt();
        for i in 2..=root {
            if let Some(pool) = pool {
                if i < pool.ceiling() && !pool.contains(i) && is_known_composite(i, pool) {
                    continue;
                }
            }
            let first = (i * i).max(lo.div_ceil(i) * i);
            for m in (first..=hi).step_by(i as usize) {
                bits.clear((m - lo) as usize);
            }
        }

        PrimeWindow { lo, hi, bits }
    }

    #[inline]
    pub fn lo(&self) -> u64 {
        self.lo
    }

    #[inline]
    pub fn hi(&self) -> u64 {
        self.hi
    }

    /// Primality of `x`, or `None` when `x` lies outside the window.
    #[inline]
    pub fn lookup(&self, x: u64) -> Option<bool> {
        if x < self.lo || x > self.hi {
            return None;
        }
        Some(self.bits.get((x - self.lo) as usize))
    }

    /// Number of primes in the window.
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    /// Primes in the window, ascending.
    pub fn iter_primes(&self) -> impl Iterator<Item = u64> + '_ {
        self.bits.iter_set_bits().map(move |i| self.lo + i as u64)
    }
}

/// A pool is only trusted to prove compositeness when it contains a prime
/// factor of `i`. This keeps a deliberately broken pool from hiding real
/// divisors.
fn is_known_composite(i: u64, pool: &SmallPrimes) -> bool {
    pool.primes()
        .iter()
        .take_while(|&&p| p * p <= i)
        .any(|&p| i % p == 0)
}

/// A packed bitmap sieve using 1 bit per entry (vs 8 bits for `Vec<bool>`).
///
/// Bit layout: bit `i` is stored in word `i / 64`, bit position `i % 64`.
/// A set bit means the position is (still) considered prime.
pub struct BitSieve {
    words: Vec<u64>,
    len: usize,
}

impl BitSieve {
    /// Create a sieve of `len` bits, all set to 1.
    pub fn new_all_set(len: usize) -> Self {
        let num_words = len.div_ceil(64);
        let mut words = vec![u64::MAX; num_words];
        // Clear unused high bits in the last word
        let extra = num_words * 64 - len;
        if extra > 0 && num_words > 0 {
            words[num_words - 1] >>= extra;
        }
        BitSieve { words, len }
    }

    /// Create a sieve of `len` bits, all cleared to 0.
    pub fn new_all_clear(len: usize) -> Self {
        BitSieve {
            words: vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get bit `index`.
    ///
    /// # Panics
    /// Panics if `index >= len` (debug builds; release builds panic only when
    /// the index leaves the backing storage).
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(
            index < self.len,
            "BitSieve index out of bounds: {} >= {}",
            index,
            self.len
        );
        self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Count the set bits using hardware POPCNT.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the indices of all set bits in ascending order.
    pub fn iter_set_bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| BitIter {
            word,
            base: wi * 64,
        })
    }
}

/// Iterator over set bits within a single u64 word.
struct BitIter {
    word: u64,
    base: usize,
}

impl Iterator for BitIter {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.word == 0 {
            return None;
        }
        let tz = self.word.trailing_zeros() as usize;
        self.word &= self.word - 1; // clear lowest set bit
        Some(self.base + tz)
    }
}

#[cfg(test)]
mod tests {
    //! # Sieve Tests
    //!
    //! Prime generation is checked against known values of pi(x)
    //! (OEIS [A000720](https://oeis.org/A000720)); segmented windows are
    //! checked against trial division, with and without a pool, including
    //! windows that straddle 0/1, perfect squares and the pool ceiling.

    use super::*;

    fn trial_division(n: u64) -> bool {
        if n < 2 {
            return false;
        }
        let mut d = 2;
        while d * d <= n {
            if n % d == 0 {
                return false;
            }
            d += 1;
        }
        true
    }

    // ── Prime Generation ──────────────────────────────────────────

    #[test]
    fn generate_primes_up_to_30() {
        assert_eq!(generate_primes(30), vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn generate_primes_small_limits() {
        assert_eq!(generate_primes(0), Vec::<u64>::new());
        assert_eq!(generate_primes(1), Vec::<u64>::new());
        assert_eq!(generate_primes(2), vec![2]);
        assert_eq!(generate_primes(6), vec![2, 3, 5]);
        assert_eq!(generate_primes(7), vec![2, 3, 5, 7]);
        assert_eq!(generate_primes(10), vec![2, 3, 5, 7]);
    }

    /// pi(100)=25, pi(1000)=168, pi(10^4)=1229, pi(10^5)=9592, pi(10^6)=78498.
    #[test]
    fn generate_primes_known_counts() {
        assert_eq!(generate_primes(100).len(), 25);
        assert_eq!(generate_primes(1000).len(), 168);
        assert_eq!(generate_primes(10_000).len(), 1229);
        assert_eq!(generate_primes(100_000).len(), 9592);
        assert_eq!(generate_primes(1_000_000).len(), 78498);
    }

    /// The ceiling is exclusive: a prime ceiling is not in its own pool.
    #[test]
    fn primes_below_excludes_ceiling() {
        assert_eq!(primes_below(0), Vec::<u64>::new());
        assert_eq!(primes_below(2), Vec::<u64>::new());
        assert_eq!(primes_below(3), vec![2]);
        assert_eq!(primes_below(11), vec![2, 3, 5, 7]);
        assert_eq!(primes_below(12), vec![2, 3, 5, 7, 11]);
        assert_eq!(primes_below(50).last(), Some(&47));
    }

    // ── Small-Prime Pool ──────────────────────────────────────────

    #[test]
    fn pool_membership_matches_list() {
        let pool = SmallPrimes::new(1000);
        assert_eq!(pool.len(), 168);
        for x in 0..1000 {
            assert_eq!(pool.contains(x), trial_division(x), "x={}", x);
        }
        assert!(!pool.contains(1009), "above the ceiling is never a member");
        assert_eq!(pool.largest(), Some(997));
    }

    #[test]
    fn pool_from_explicit_list_is_normalized() {
        let pool = SmallPrimes::from_primes(20, vec![7, 3, 3, 5, 23, 11]);
        assert_eq!(pool.primes(), &[3, 5, 7, 11]);
        assert!(!pool.contains(2));
        assert!(pool.contains(3));
        assert!(!pool.contains(23));
    }

    // ── Segmented Windows ─────────────────────────────────────────

    #[test]
    fn window_from_zero_matches_trial_division() {
        let w = PrimeWindow::sieve(0, 500, None);
        for x in 0..=500 {
            assert_eq!(w.lookup(x), Some(trial_division(x)), "x={}", x);
        }
        assert_eq!(w.count(), 95);
    }

    #[test]
    fn window_including_one_only() {
        let w = PrimeWindow::sieve(1, 3, None);
        assert_eq!(w.lookup(1), Some(false));
        assert_eq!(w.lookup(2), Some(true));
        assert_eq!(w.lookup(3), Some(true));
        assert_eq!(w.lookup(0), None);
        assert_eq!(w.lookup(4), None);
    }

    /// Windows whose upper end is a perfect square must still clear it: the
    /// divisor loop is inclusive of isqrt(hi).
    #[test]
    fn window_ending_on_perfect_square() {
        for &sq in &[49u64, 121, 169, 961, 10_201] {
            let w = PrimeWindow::sieve(sq - 10, sq, None);
            assert_eq!(w.lookup(sq), Some(false), "{} is composite", sq);
        }
    }

    #[test]
    fn window_far_from_zero_matches_trial_division() {
        let lo = 1_000_000_000;
        let hi = lo + 2_000;
        let pool = SmallPrimes::new(50_000);
        let w = PrimeWindow::sieve(lo, hi, Some(&pool));
        for x in lo..=hi {
            assert_eq!(w.lookup(x), Some(trial_division(x)), "x={}", x);
        }
    }

    #[test]
    fn pool_assisted_window_matches_plain_window() {
        let pool = SmallPrimes::new(200);
        let plain = PrimeWindow::sieve(30_000, 40_000, None);
        let assisted = PrimeWindow::sieve(30_000, 40_000, Some(&pool));
        let a: Vec<u64> = plain.iter_primes().collect();
        let b: Vec<u64> = assisted.iter_primes().collect();
        assert_eq!(a, b);
    }

    /// A pool with a missing prime must not make the window wrong: 2 is not
    /// in the pool, so evens are still cleared by divisor 2 itself.
    #[test]
    fn broken_pool_does_not_corrupt_window() {
        let pool = SmallPrimes::from_primes(100, vec![3, 5, 7, 11]);
        let w = PrimeWindow::sieve(1000, 1100, Some(&pool));
        for x in 1000..=1100 {
            assert_eq!(w.lookup(x), Some(trial_division(x)), "x={}", x);
        }
    }

    #[test]
    fn single_point_windows() {
        assert_eq!(PrimeWindow::sieve(97, 97, None).lookup(97), Some(true));
        assert_eq!(PrimeWindow::sieve(91, 91, None).lookup(91), Some(false));
        assert_eq!(PrimeWindow::sieve(0, 0, None).count(), 0);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn window_past_supported_end_panics() {
        let _ = PrimeWindow::sieve(u64::MAX - 1, u64::MAX, None);
    }

    #[test]
    #[should_panic(expected = "empty sieve window")]
    fn inverted_window_panics() {
        let _ = PrimeWindow::sieve(10, 9, None);
    }

    // ── BitSieve ──────────────────────────────────────────────────

    /// `new_all_set(100)` uses 2 words; the 28 padding bits of the last word
    /// must stay clear or `count_ones` would report 128.
    #[test]
    fn bitsieve_new_all_set_masks_padding() {
        let bs = BitSieve::new_all_set(100);
        assert_eq!(bs.len(), 100);
        assert_eq!(bs.count_ones(), 100);
        assert_eq!(bs.words.len(), 2);
    }

    #[test]
    fn bitsieve_word_boundaries() {
        let mut bs = BitSieve::new_all_clear(256);
        for &i in &[0usize, 63, 64, 127, 128, 255] {
            bs.set(i);
        }
        assert_eq!(bs.count_ones(), 6);
        assert_eq!(
            bs.iter_set_bits().collect::<Vec<_>>(),
            vec![0, 63, 64, 127, 128, 255]
        );
        bs.clear(64);
        assert!(!bs.get(64));
        assert!(bs.get(63));
        assert_eq!(bs.count_ones(), 5);
    }

    #[test]
    fn bitsieve_empty() {
        let bs = BitSieve::new_all_set(0);
        assert!(bs.is_empty());
        assert_eq!(bs.count_ones(), 0);
        assert_eq!(bs.iter_set_bits().count(), 0);
    }
}
