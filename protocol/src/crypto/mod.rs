//! # Cryptographic Primitives for Bon
//!
//! Everything security-related bottoms out here:
//!
//! - **Ed25519** for voucher identities, offer and acknowledgement
//!   signatures, and witness event authorship.
//! - **AES-256-GCM** for sealing shares, in transit and at rest on the
//!   witness network.
//! - **SHA-256** where another implementation must reproduce our bytes;
//!   **BLAKE3** for local fingerprints and key derivation.
//!
//! Thin wrappers over audited crates. No hand-rolled primitives; share math
//! lives in [`crate::sharing`] on top of `bc-shamir`.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use encryption::{open_share, seal_share, EncryptedShare, EncryptionError};
pub use hash::{blake3_hash, market_key_from_seed, sha256, share_transport_key};
pub use keys::{BonId, BonKeypair, BonPublicKey, BonSignature, KeyError};
pub use signatures::{derive_public_key, sign, verify};
