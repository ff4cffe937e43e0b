//! Interfaces to the two external oracles the engine consumes.
//!
//! The engine never produces randomness itself: it asks a [`RandomnessOracle`] for a
//! request handle and only accepts a value later delivered against a handle it issued.
//! Prices come from a [`PriceOracle`] and are read once per round, at round open.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::hash::Hash;

use crate::error::RaffleError;

/// Raw verifiable randomness as delivered by the oracle
pub type RandomValue = [u8; 32];

/// Opaque identifier of one randomness request
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestHandle(pub [u8; 32]);

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Hash::new_from_array(self.0), f)
    }
}

/// Base/quote symbols of the price pair, NUL padded to 8 bytes each
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TokenPair {
    pub base: [u8; 8],
    pub quote: [u8; 8],
}

impl TokenPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: symbol(base),
            quote: symbol(quote),
        }
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trim = |raw: &[u8; 8]| -> String {
            raw.iter()
                .take_while(|b| **b != 0)
                .map(|b| *b as char)
                .collect()
        };
        write!(f, "{}/{}", trim(&self.base), trim(&self.quote))
    }
}

fn symbol(name: &str) -> [u8; 8] {
    let mut out = [0u8; 8];
    let bytes = name.as_bytes();
    let len = std::cmp::min(bytes.len(), out.len());
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// Widen a small integer seed into a random value (little endian, zero padded)
pub fn random_value_from_u64(value: u64) -> RandomValue {
    let mut out = [0u8; 32];
    out[..8].copy_from_slice(&value.to_le_bytes());
    out
}

/// Source of verifiable randomness, answered asynchronously
pub trait RandomnessOracle {
    /// Submit a request for `round_id` and return the handle the fulfillment will carry.
    /// Fails with `OracleUnavailable` when the request cannot be placed.
    fn request(&mut self, round_id: u64) -> Result<RequestHandle, RaffleError>;
}

/// Source of the exchange rate used to price a ticket
pub trait PriceOracle {
    /// Lamports per one stable unit of `pair`. Fails with `PriceUnavailable` when the
    /// rate is missing or stale.
    fn current_rate(&self, pair: &TokenPair) -> Result<u64, RaffleError>;
}
