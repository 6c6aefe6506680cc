//! # Digital Signatures
//!
//! Signing and verification over raw key material.
//!
//! The transfer protocol mostly works with a reconstructed 32-byte seed
//! rather than a long-lived keypair object, so these helpers take the seed
//! directly. Ed25519 is a Schnorr-family scheme over the same curve as the
//! voucher identity keys: `R = rG`, `s = r + H(R, A, M)·a`.
//!
//! The intermediate [`BonKeypair`] built inside [`sign`] is dropped (and
//! zeroized by ed25519-dalek) before the function returns.

use super::keys::{BonKeypair, BonPublicKey, BonSignature, KeyError};

/// Derive the public key for a 32-byte secret seed.
///
/// Used to check that a reconstructed key really belongs to the `bonId` it
/// claims to.
pub fn derive_public_key(private_key: &[u8]) -> Result<BonPublicKey, KeyError> {
    Ok(BonKeypair::from_slice(private_key)?.public_key())
}

/// Sign `message` with a raw 32-byte secret seed.
pub fn sign(message: &[u8], private_key: &[u8]) -> Result<BonSignature, KeyError> {
    let keypair = BonKeypair::from_slice(private_key)?;
    Ok(keypair.sign(message))
}

/// Verify a signature. `false` for any failure; callers decide what a
/// failure means for them.
pub fn verify(message: &[u8], signature: &BonSignature, public_key: &BonPublicKey) -> bool {
    public_key.verify(message, signature)
}
