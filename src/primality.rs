//! # Primality — Deterministic Miller–Rabin for u64
//!
//! Used where no sieve covers a value: the bounded fallback search of the
//! chunk processor, and as an independent oracle in tests.
//!
//! Testing against the first twelve primes as bases is deterministic for all
//! n < 3.3·10²⁴, which covers every u64. Modular arithmetic runs in
//! Montgomery form (`MontgomeryCtx`): multiply+shift instead of u128 division.
//!
//! ## References
//!
//! - Peter L. Montgomery, "Modular Multiplication Without Trial Division",
//!   Mathematics of Computation, 44(170):519–521, 1985.
//! - Jiang & Deng, "Strong pseudoprimes to the first eight prime bases",
//!   Mathematics of Computation, 83(290):2915–2924, 2014.

const MR_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Deterministic primality test for any u64.
pub fn is_prime_u64(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &MR_BASES {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }

    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;
    if n < 1 << 63 {
        let ctx = MontgomeryCtx::new(n);
        let one = ctx.one();
        let minus_one = ctx.to_mont(n - 1);
        MR_BASES.iter().all(|&a| {
            strong_probable_prime(ctx.pow_mod(ctx.to_mont(a), d), s, one, minus_one, |x| {
                ctx.sqr(x)
            })
        })
    } else {
        // REDC would overflow u128 here.
        MR_BASES.iter().all(|&a| {
            strong_probable_prime(pow_mod(a, d, n), s, 1, n - 1, |x| {
                (x as u128 * x as u128 % n as u128) as u64
            })
        })
    }
}

/// One Miller-Rabin round given `x = a^d`, in whatever representation
/// `one`, `minus_one` and `sqr` share.
#[inline]
fn strong_probable_prime(
    mut x: u64,
    s: u32,
    one: u64,
    minus_one: u64,
    sqr: impl Fn(u64) -> u64,
) -> bool {
    if x == one || x == minus_one {
        return true;
    }
    for _ in 1..s {
        x = sqr(x);
        if x == minus_one {
            return true;
        }
    }
    false
}

/// Modular exponentiation: base^exp mod modulus.
/// Uses u128 intermediates, so any u64 modulus is safe.
pub fn pow_mod(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result: u64 = 1;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = (result as u128 * base as u128 % modulus as u128) as u64;
        }
        exp >>= 1;
        base = (base as u128 * base as u128 % modulus as u128) as u64;
    }
    result
}

/// Montgomery multiplication context for a fixed odd modulus below 2^63.
///
/// All arithmetic is performed in Montgomery form: ā = a·R mod n, where R = 2^64.
#[derive(Clone, Copy, Debug)]
pub struct MontgomeryCtx {
    pub n: u64,
    /// -n⁻¹ mod 2^64 (precomputed via Hensel lifting).
    n_prime: u64,
    /// R mod n (Montgomery form of 1).
    r_mod_n: u64,
    /// R² mod n (used for converting to Montgomery form).
    r2_mod_n: u64,
}

impl MontgomeryCtx {
    pub fn new(n: u64) -> Self {
        debug_assert!(n > 1 && n & 1 == 1, "Montgomery requires odd modulus > 1");

        // Hensel lifting: each iteration doubles the bits of precision of n⁻¹.
        // 6 iterations: 2^1 → 2^2 → 2^4 → 2^8 → 2^16 → 2^32 → 2^64.
        let mut inv: u64 = 1;
        for _ in 0..6 {
            inv = inv.wrapping_mul(2u64.wrapping_sub(n.wrapping_mul(inv)));
        }

        let r_mod_n = ((1u128 << 64) % n as u128) as u64;
        let r2_mod_n = ((r_mod_n as u128 * r_mod_n as u128) % n as u128) as u64;

        MontgomeryCtx {
            n,
            n_prime: inv.wrapping_neg(),
            r_mod_n,
            r2_mod_n,
        }
    }

    #[inline]
    pub fn to_mont(&self, a: u64) -> u64 {
        self.mul(a % self.n, self.r2_mod_n)
    }

    #[inline]
    pub fn from_mont(&self, a: u64) -> u64 {
        self.reduce(a as u128)
    }

    /// REDC: t·R⁻¹ mod n.
    #[inline]
    fn reduce(&self, t: u128) -> u64 {
        let m = (t as u64).wrapping_mul(self.n_prime);
        let u = t + (m as u128) * (self.n as u128);
        let result = (u >> 64) as u64;
        if result >= self.n {
            result - self.n
        } else {
            result
        }
    }

    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        self.reduce((a as u128) * (b as u128))
    }

    #[inline]
    pub fn sqr(&self, a: u64) -> u64 {
        self.mul(a, a)
    }

    /// Input base in Montgomery form; result in Montgomery form.
    pub fn pow_mod(&self, base: u64, mut exp: u64) -> u64 {
        let mut result = self.r_mod_n;
        let mut b = base;
        while exp > 0 {
            if exp & 1 == 1 {
                result = self.mul(result, b);
            }
            exp >>= 1;
            if exp > 0 {
                b = self.sqr(b);
            }
        }
        result
    }

    #[inline]
    pub fn one(&self) -> u64 {
        self.r_mod_n
    }
}
