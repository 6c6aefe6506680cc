//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256** where the result crosses device boundaries and other
//!   implementations must reproduce it: the key that protects a carrier
//!   share in transit, and the V2 acknowledgement challenge digest.
//! - **BLAKE3** for everything local: payload fingerprints, witness event
//!   ids, and deriving `K_market` from a market seed.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::config::MARKET_KEY_CONTEXT;

/// SHA-256 as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// BLAKE3 as a fixed-size array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive the AES key that protects a carrier share in transit.
///
/// `key = SHA-256(witness_share)`. Anyone holding the witness share (every
/// synced market member) can derive it, which is the point: the offer QR is
/// only useful to someone who is already part of the market.
pub fn share_transport_key(witness_share: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(sha256(witness_share))
}

/// Derive a market's symmetric key from its out-of-band seed.
pub fn market_key_from_seed(seed: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(blake3::derive_key(MARKET_KEY_CONTEXT, seed))
}
