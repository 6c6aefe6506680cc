//! # Key Management
//!
//! Ed25519 keypairs for vouchers and device identities.
//!
//! Every voucher *is* a keypair: the 32-byte public key is its permanent
//! identifier (`bonId`), and whoever can reconstruct the private key owns
//! it. Devices also hold a long-lived identity keypair that authors witness
//! events. Both use the same types.
//!
//! ## Security considerations
//!
//! - A voucher's private key is never stored whole. It exists only while a
//!   [`BonKeypair`] built from reconstructed shares is alive, and
//!   ed25519-dalek zeroizes the signing key on drop.
//! - Seed exports come back wrapped in [`Zeroizing`] so the copy is wiped
//!   too.
//! - Key bytes are never logged.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH};

/// Errors that can occur during key operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key length: expected {SECRET_KEY_LENGTH} bytes, got {0}")]
    InvalidSecretKeyLength(usize),

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature bytes: expected {SIGNATURE_LENGTH} bytes")]
    InvalidSignature,
}

/// An Ed25519 keypair. Either a voucher's ephemeral key or a device identity.
///
/// Deliberately not `Serialize`. Persisting a voucher key whole would defeat
/// the entire share scheme.
pub struct BonKeypair {
    signing_key: SigningKey,
}

/// The public half of a keypair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BonPublicKey {
    bytes: [u8; PUBLIC_KEY_LENGTH],
}

/// A voucher identifier is the voucher's public key. Nothing more.
pub type BonId = BonPublicKey;

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BonSignature {
    bytes: [u8; SIGNATURE_LENGTH],
}

impl BonKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a keypair from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Build a keypair from a slice, checking the length first.
    pub fn from_slice(seed: &[u8]) -> Result<Self, KeyError> {
        let seed: &[u8; SECRET_KEY_LENGTH] = seed
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKeyLength(seed.len()))?;
        Ok(Self::from_seed(seed))
    }

    /// Parse a hex-encoded seed. Meant for device identity files, never for
    /// voucher keys.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(
            hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKeyLength(0))?,
        );
        Self::from_slice(&bytes)
    }

    /// The public key for this keypair.
    pub fn public_key(&self) -> BonPublicKey {
        BonPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Ed25519 is deterministic, so no RNG is involved here.
    pub fn sign(&self, message: &[u8]) -> BonSignature {
        BonSignature {
            bytes: self.signing_key.sign(message).to_bytes(),
        }
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &BonSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Export the 32-byte seed. The copy wipes itself when dropped.
    pub fn secret_seed(&self) -> Zeroizing<[u8; SECRET_KEY_LENGTH]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for BonKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret material, not even a prefix.
        write!(f, "BonKeypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// BonPublicKey
// ---------------------------------------------------------------------------

impl BonPublicKey {
    /// Parse a public key, rejecting bytes that are not a valid Ed25519 point.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Same as [`from_bytes`](Self::from_bytes) for an arbitrary slice.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_bytes(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.bytes
    }

    /// Verify a signature. Any failure, including a degenerate key, is `false`.
    pub fn verify(&self, message: &[u8], signature: &BonSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&signature.bytes);
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Hex-encoded key, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse and validate a hex-encoded key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }

    /// First eight hex characters, for log lines and UI labels.
    pub fn short(&self) -> String {
        hex::encode(&self.bytes[..4])
    }
}

impl Hash for BonPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for BonPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for BonPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BonPublicKey({})", self.short())
    }
}

impl Serialize for BonPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BonPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// BonSignature
// ---------------------------------------------------------------------------

impl BonSignature {
    /// Wrap raw signature bytes. Validity is only known at verification time.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Length-checked constructor.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; SIGNATURE_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { bytes })
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    /// Hex-encoded signature, 128 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Debug for BonSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "BonSignature({}...{})", &hex_str[..8], &hex_str[120..])
    }
}

impl Serialize for BonSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BonSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::try_from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}
