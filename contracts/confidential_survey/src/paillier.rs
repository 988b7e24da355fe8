//! Additively homomorphic Paillier arithmetic over `i128` residues.
//!
//! The contract only ever holds the public key: it multiplies ciphertexts
//! (which adds the plaintexts) and produces trivial encryptions of small
//! constants. Decryption happens off-chain in the oracle; the private-key
//! half lives behind `testutils` so harnesses can play that role.

use soroban_sdk::contracttype;

/// Upper bound on `n^2` so that the product of two residues fits in `i128`.
pub const MAX_MODULUS_SQUARED: i128 = 1 << 62;

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaillierPublicKey {
    pub n: i128,  // n = p * q
    pub nn: i128, // n^2
    pub g: i128,  // g = n + 1
}

impl PaillierPublicKey {
    /// Checks the structural relations between `n`, `nn` and `g`.
    pub fn is_well_formed(&self) -> bool {
        self.n > 1
            && self.nn <= MAX_MODULUS_SQUARED
            && self.n.checked_mul(self.n) == Some(self.nn)
            && self.g == self.n + 1
    }

    /// A ciphertext must be a unit modulo `n^2`: in `(0, n^2)` and coprime
    /// with `n`.
    pub fn is_residue(&self, c: i128) -> bool {
        c > 0 && c < self.nn && gcd(c, self.n) == 1
    }
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// E(m1) * E(m2) mod n^2 = E(m1 + m2).
pub(crate) fn add_ciphertexts(pub_key: &PaillierPublicKey, c1: i128, c2: i128) -> i128 {
    (c1 * c2) % pub_key.nn
}

/// Encryption with r = 1. With g = n + 1, g^m mod n^2 collapses to 1 + m*n.
pub(crate) fn trivial_encrypt(pub_key: &PaillierPublicKey, m: i128) -> i128 {
    (1 + (m % pub_key.n) * pub_key.n) % pub_key.nn
}

#[cfg(any(test, feature = "testutils"))]
pub use keys::*;

#[cfg(any(test, feature = "testutils"))]
mod keys {
    use super::PaillierPublicKey;

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct PaillierPrivateKey {
        pub lambda: i128, // phi(n) = (p-1)(q-1)
        pub mu: i128,     // lambda^-1 mod n
    }

    /// Builds a key pair from two distinct primes of similar size.
    pub fn keypair(p: i128, q: i128) -> (PaillierPublicKey, PaillierPrivateKey) {
        let n = p * q;
        let lambda = (p - 1) * (q - 1);
        let pub_key = PaillierPublicKey {
            n,
            nn: n * n,
            g: n + 1,
        };
        let mu = mod_inverse(lambda % n, n);
        (pub_key, PaillierPrivateKey { lambda, mu })
    }

    /// c = (g^m * r^n) mod n^2. `r` must be coprime with n.
    pub fn encrypt(pub_key: &PaillierPublicKey, m: i128, r: i128) -> i128 {
        let nn = pub_key.nn;
        let gm = pow_mod(pub_key.g, m, nn);
        let rn = pow_mod(r, pub_key.n, nn);
        (gm * rn) % nn
    }

    pub fn decrypt(pub_key: &PaillierPublicKey, priv_key: &PaillierPrivateKey, c: i128) -> i128 {
        let n = pub_key.n;
        // L(u) = (u - 1) / n
        let u = pow_mod(c, priv_key.lambda, pub_key.nn);
        let l_u = (u - 1) / n;
        (l_u * priv_key.mu) % n
    }

    fn pow_mod(mut base: i128, mut exp: i128, mod_val: i128) -> i128 {
        let mut res = 1;
        base %= mod_val;
        while exp > 0 {
            if exp % 2 == 1 {
                res = (res * base) % mod_val;
            }
            base = (base * base) % mod_val;
            exp /= 2;
        }
        res
    }

    fn mod_inverse(a: i128, m: i128) -> i128 {
        let (mut old_r, mut r) = (a, m);
        let (mut old_s, mut s) = (1i128, 0i128);
        while r != 0 {
            let q = old_r / r;
            (old_r, r) = (r, old_r - q * r);
            (old_s, s) = (s, old_s - q * s);
        }
        old_s.rem_euclid(m)
    }
}
