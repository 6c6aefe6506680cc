//! # Share Sealing (AES-256-GCM)
//!
//! Shares travel encrypted in exactly two places:
//!
//! - The **carrier** share rides inside the offer QR, sealed under
//!   `SHA-256(witness_share)`.
//! - The **witness** share is published to the witness network, sealed under
//!   the market key `K_market`.
//!
//! Both use AES-256-GCM with a random 96-bit nonce and a *detached* 16-byte
//! tag, because the offer layout stores ciphertext, nonce and tag as three
//! separate fixed-width fields. The plaintext is always one 32-byte share, so
//! the ciphertext is always 32 bytes as well.
//!
//! A tag mismatch is [`EncryptionError::AuthenticationFailure`]. Callers must
//! treat it as final for the inputs at hand: the same ciphertext will fail
//! the same way forever.

use std::fmt;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH, SHARE_LENGTH};

/// Errors from sealing and opening shares.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    /// Wrong key or modified ciphertext/nonce/tag. We don't say which.
    #[error("authentication failure: wrong key or tampered ciphertext")]
    AuthenticationFailure,

    #[error("malformed sealed share encoding")]
    MalformedEncoding,
}

/// A share sealed with AES-256-GCM, fields kept separate for the QR layout.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EncryptedShare {
    pub ciphertext: [u8; SHARE_LENGTH],
    pub nonce: [u8; AES_NONCE_LENGTH],
    pub tag: [u8; AES_TAG_LENGTH],
}

/// Encoded length of `ciphertext || nonce || tag`.
pub const ENCRYPTED_SHARE_LENGTH: usize = SHARE_LENGTH + AES_NONCE_LENGTH + AES_TAG_LENGTH;

/// Seal a 32-byte share under a 32-byte key with a fresh random nonce.
pub fn seal_share(
    plaintext: &[u8; SHARE_LENGTH],
    key: &[u8; AES_KEY_LENGTH],
) -> Result<EncryptedShare, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let mut buffer = *plaintext;
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut tag_bytes = [0u8; AES_TAG_LENGTH];
    tag_bytes.copy_from_slice(&tag);

    Ok(EncryptedShare {
        ciphertext: buffer,
        nonce,
        tag: tag_bytes,
    })
}

/// Open a sealed share. The plaintext comes back in a zeroizing buffer.
pub fn open_share(
    sealed: &EncryptedShare,
    key: &[u8; AES_KEY_LENGTH],
) -> Result<Zeroizing<[u8; SHARE_LENGTH]>, EncryptionError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::AuthenticationFailure)?;

    let mut buffer = Zeroizing::new(sealed.ciphertext);
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&sealed.nonce),
            b"",
            buffer.as_mut_slice(),
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| EncryptionError::AuthenticationFailure)?;

    Ok(buffer)
}

impl EncryptedShare {
    /// `ciphertext || nonce || tag`.
    pub fn to_bytes(&self) -> [u8; ENCRYPTED_SHARE_LENGTH] {
        let mut out = [0u8; ENCRYPTED_SHARE_LENGTH];
        out[..SHARE_LENGTH].copy_from_slice(&self.ciphertext);
        out[SHARE_LENGTH..SHARE_LENGTH + AES_NONCE_LENGTH].copy_from_slice(&self.nonce);
        out[SHARE_LENGTH + AES_NONCE_LENGTH..].copy_from_slice(&self.tag);
        out
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncryptionError> {
        if bytes.len() != ENCRYPTED_SHARE_LENGTH {
            return Err(EncryptionError::MalformedEncoding);
        }
        let mut sealed = Self {
            ciphertext: [0u8; SHARE_LENGTH],
            nonce: [0u8; AES_NONCE_LENGTH],
            tag: [0u8; AES_TAG_LENGTH],
        };
        sealed.ciphertext.copy_from_slice(&bytes[..SHARE_LENGTH]);
        sealed
            .nonce
            .copy_from_slice(&bytes[SHARE_LENGTH..SHARE_LENGTH + AES_NONCE_LENGTH]);
        sealed
            .tag
            .copy_from_slice(&bytes[SHARE_LENGTH + AES_NONCE_LENGTH..]);
        Ok(sealed)
    }
}

impl fmt::Debug for EncryptedShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedShare(nonce={})", hex::encode(self.nonce))
    }
}

impl Serialize for EncryptedShare {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for EncryptedShare {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn seal_open_roundtrip() {
        let share = [0xA5u8; 32];
        let sealed = seal_share(&share, &test_key()).unwrap();
        assert_ne!(sealed.ciphertext, share);
        assert_eq!(*open_share(&sealed, &test_key()).unwrap(), share);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut sealed = seal_share(&[1u8; 32], &test_key()).unwrap();
        sealed.ciphertext[5] ^= 0x80;
        assert_eq!(
            open_share(&sealed, &test_key()).unwrap_err(),
            EncryptionError::AuthenticationFailure
        );
    }

    #[test]
    fn tampered_tag_fails() {
        let mut sealed = seal_share(&[1u8; 32], &test_key()).unwrap();
        sealed.tag[15] ^= 0x01;
        assert!(open_share(&sealed, &test_key()).is_err());
    }

    #[test]
    fn tampered_nonce_fails() {
        let mut sealed = seal_share(&[1u8; 32], &test_key()).unwrap();
        sealed.nonce[0] ^= 0x01;
        assert!(open_share(&sealed, &test_key()).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal_share(&[9u8; 32], &test_key()).unwrap();
        let mut wrong = test_key();
        wrong[31] ^= 0xFF;
        assert!(open_share(&sealed, &wrong).is_err());
    }

    #[test]
    fn nonces_are_fresh() {
        let a = seal_share(&[0u8; 32], &test_key()).unwrap();
        let b = seal_share(&[0u8; 32], &test_key()).unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn byte_encoding_roundtrip() {
        let sealed = seal_share(&[3u8; 32], &test_key()).unwrap();
        let bytes = sealed.to_bytes();
        assert_eq!(bytes.len(), 60);
        assert_eq!(EncryptedShare::from_bytes(&bytes).unwrap(), sealed);
        assert!(EncryptedShare::from_bytes(&bytes[..59]).is_err());
    }
}
