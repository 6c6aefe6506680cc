//! # Voucher Key Splitting
//!
//! Turns exclusive key possession into a transferable bearer instrument.
//!
//! A voucher's 32-byte Ed25519 seed is split with `bc-shamir`, threshold 2,
//! three shares. The share index is fixed by role:
//!
//! ```text
//!   anchor  = share 0   issuer only, recovery
//!   carrier = share 1   current holder, moves on every transfer
//!   witness = share 2   sealed under K_market, public
//! ```
//!
//! Carrier + witness is the transfer path. Anchor + witness is the issuer's
//! recovery path. Any single share says nothing about the seed, which is
//! why publishing the witness share (even with the market key leaked) does
//! not hand out voucher keys.
//!
//! `bc-shamir` hides a short digest of the secret in the polynomial, so two
//! shares that never belonged together usually fail to combine with
//! [`ShareError::Mismatched`]. The digest is only 32 bits: callers still
//! compare the rebuilt public key against the `bonId`.

pub mod ephemeral;
pub mod share;

use bc_rand::SecureRandomNumberGenerator;
use bc_shamir::{recover_secret, split_secret};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{SECRET_KEY_LENGTH, SHARE_LENGTH};

pub use ephemeral::{with_ephemeral_key, EphemeralKey};
pub use share::{SecretShare, ShareRole, ShareSet};

/// Any two shares rebuild the key.
pub const THRESHOLD: usize = 2;

/// Anchor, carrier, witness.
pub const SHARE_COUNT: usize = 3;

/// Errors from splitting and combining.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("invalid key length: expected {SECRET_KEY_LENGTH} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("both shares have role {0}; need two distinct roles")]
    DuplicateRole(ShareRole),

    #[error("shares do not belong to the same key: {0}")]
    Mismatched(String),

    #[error("secret sharing failed: {0}")]
    Engine(String),
}

/// Split a 32-byte private key into anchor, carrier and witness shares.
///
/// Fresh randomness on every call: splitting the same key twice gives two
/// unrelated share sets, each of which reconstructs the key.
pub fn split(private_key: &[u8]) -> Result<ShareSet, ShareError> {
    if private_key.len() != SECRET_KEY_LENGTH {
        return Err(ShareError::InvalidKeyLength(private_key.len()));
    }

    let mut rng = SecureRandomNumberGenerator;
    let shares = Zeroizing::new(
        split_secret(THRESHOLD, SHARE_COUNT, private_key, &mut rng)
            .map_err(|e| ShareError::Engine(e.to_string()))?,
    );

    let take = |role: ShareRole| -> Result<SecretShare, ShareError> {
        let bytes: [u8; SHARE_LENGTH] = shares
            .get(role.index())
            .and_then(|s| s.as_slice().try_into().ok())
            .ok_or_else(|| ShareError::Engine(format!("no {SHARE_LENGTH}-byte {role} share")))?;
        Ok(SecretShare::new(role, bytes))
    };

    Ok(ShareSet {
        anchor: take(ShareRole::Anchor)?,
        carrier: take(ShareRole::Carrier)?,
        witness: take(ShareRole::Witness)?,
    })
}

/// Reconstruct the private key from two shares of different roles.
///
/// Deterministic. Shares from different splits are rejected when the
/// embedded digest catches them.
pub fn combine(a: &SecretShare, b: &SecretShare) -> Result<Zeroizing<[u8; SECRET_KEY_LENGTH]>, ShareError> {
    if a.role() == b.role() {
        return Err(ShareError::DuplicateRole(a.role()));
    }

    let indexes = [a.role().index(), b.role().index()];
    let shares = [a.as_bytes().as_slice(), b.as_bytes().as_slice()];
    let recovered = Zeroizing::new(
        recover_secret(&indexes, &shares).map_err(|e| ShareError::Mismatched(e.to_string()))?,
    );
    if recovered.len() != SECRET_KEY_LENGTH {
        return Err(ShareError::InvalidKeyLength(recovered.len()));
    }

    let mut secret = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
    secret.copy_from_slice(&recovered);
    Ok(secret)
}

/// Issuer recovery: rebuild the key from the anchor and the witness share,
/// without the carrier.
pub fn recover_with_anchor(
    anchor: &SecretShare,
    witness: &SecretShare,
) -> Result<Zeroizing<[u8; SECRET_KEY_LENGTH]>, ShareError> {
    combine(anchor, witness)
}
