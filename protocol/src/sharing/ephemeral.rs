//! Scoped access to a reconstructed voucher key.
//!
//! The reconstructed key is a bearer secret. It lives inside an
//! [`EphemeralKey`] whose only exits are `Drop` paths: success, error,
//! early return and task cancellation all run the same destructor, and
//! ed25519-dalek wipes the signing key there. The intermediate seed buffer
//! is a `Zeroizing` that is dropped before `reconstruct` returns.

use std::fmt;

use crate::crypto::keys::{BonId, BonKeypair, BonSignature};

use super::{combine, SecretShare, ShareError};

/// A voucher private key rebuilt from two shares.
pub struct EphemeralKey {
    keypair: BonKeypair,
}

impl EphemeralKey {
    /// Rebuild the key from any two distinct shares.
    ///
    /// Mismatched shares are usually rejected here; the rest produce a
    /// *different* key. Check [`matches`](Self::matches) before trusting
    /// the result.
    pub fn reconstruct(a: &SecretShare, b: &SecretShare) -> Result<Self, ShareError> {
        let seed = combine(a, b)?;
        Ok(Self {
            keypair: BonKeypair::from_seed(&seed),
        })
    }

    /// Public key of the reconstructed secret.
    pub fn public_key(&self) -> BonId {
        self.keypair.public_key()
    }

    /// Whether this key is the private half of `bon_id`.
    pub fn matches(&self, bon_id: &BonId) -> bool {
        self.public_key() == *bon_id
    }

    pub fn sign(&self, message: &[u8]) -> BonSignature {
        self.keypair.sign(message)
    }
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EphemeralKey(pub={})", self.public_key().short())
    }
}

/// Reconstruct, run `f`, and wipe the key whatever `f` returns.
///
/// This is the preferred way to use a reconstructed key: it cannot escape
/// the closure.
pub fn with_ephemeral_key<T, E, F>(a: &SecretShare, b: &SecretShare, f: F) -> Result<T, E>
where
    E: From<ShareError>,
    F: FnOnce(&EphemeralKey) -> Result<T, E>,
{
    let key = EphemeralKey::reconstruct(a, b)?;
    f(&key)
}
