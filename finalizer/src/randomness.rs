//! Commit-reveal nonces.
//!
//! The production source is a small, non-cryptographic PRNG. Its values are
//! hidden only until reveal; whether that is strong enough for raffles with
//! real value is an open question for the contract owners.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sha3::{Digest, Keccak256};
use std::collections::VecDeque;
use web3::types::H256;

/// Nonces are drawn from `[0, NONCE_BOUND)`.
pub const NONCE_BOUND: u64 = 1_000_000_000;

pub trait NonceSource {
    fn next_nonce(&mut self) -> u64;
}

pub struct WeakNonceSource {
    rng: SmallRng,
}

impl WeakNonceSource {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl Default for WeakNonceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceSource for WeakNonceSource {
    fn next_nonce(&mut self) -> u64 {
        self.rng.gen_range(0..NONCE_BOUND)
    }
}

/// Hands out a fixed sequence, then repeats the last value.
#[derive(Debug, Clone, Default)]
pub struct FixedNonceSource {
    queue: VecDeque<u64>,
    last: u64,
}

impl FixedNonceSource {
    pub fn new(nonces: impl IntoIterator<Item = u64>) -> Self {
        Self {
            queue: nonces.into_iter().collect(),
            last: 0,
        }
    }
}

impl NonceSource for FixedNonceSource {
    fn next_nonce(&mut self) -> u64 {
        if let Some(n) = self.queue.pop_front() {
            self.last = n;
        }
        self.last
    }
}

/// keccak-256 over the decimal string of `nonce`.
pub fn commitment_hash(nonce: u64) -> H256 {
    H256::from_slice(Keccak256::digest(nonce.to_string().as_bytes()).as_slice())
}
