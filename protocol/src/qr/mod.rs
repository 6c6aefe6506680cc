//! # QR Payload Codec
//!
//! The only bit-exact contract in the protocol. Two QR payloads cross the
//! air gap in every exchange:
//!
//! ```text
//!   donor ── offer ─────────► recipient
//!   donor ◄─ acknowledgement ─ recipient
//! ```
//!
//! Layouts are fixed-width big-endian fields with no framing and no version
//! byte. The decoder is told which [`ProtocolVersion`] is in use and checks
//! the exact length for that version; anything else is a
//! [`PayloadFormatError`].
//!
//! QR scanners hand back either the raw symbol bytes or, for scanners that
//! only do text, standard base64. [`from_scanned`] accepts both.

mod ack;
mod error;
mod offer;

use std::borrow::Cow;
use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::config::CHALLENGE_LENGTH;
use crate::crypto::hash::{blake3_hash, sha256};

pub use ack::{AckPayload, AckStatus};
pub use error::PayloadFormatError;
pub use offer::{OfferPayload, OFFER_V1_LENGTH, OFFER_V2_MIN_LENGTH};

/// Offer layout generation. Also fixes what the acknowledgement signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// Fixed 213-byte offer, no issuer name. Ack signs the raw challenge.
    V1,
    /// Offer carries a length-prefixed issuer name. Ack signs
    /// `SHA-256(challenge)`.
    V2,
}

impl ProtocolVersion {
    /// The exact bytes a recipient signs (and a donor verifies) for `challenge`.
    ///
    /// V1 and V2 are not interchangeable: a V1 signature never verifies as
    /// V2 and vice versa.
    pub fn ack_message(self, challenge: &[u8; CHALLENGE_LENGTH]) -> Vec<u8> {
        match self {
            ProtocolVersion::V1 => challenge.to_vec(),
            ProtocolVersion::V2 => sha256(challenge).to_vec(),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => f.write_str("v1"),
            ProtocolVersion::V2 => f.write_str("v2"),
        }
    }
}

/// BLAKE3 of the raw payload bytes. Identifies "the same offer" across
/// rescans without parsing it.
pub fn fingerprint(payload: &[u8]) -> [u8; 32] {
    blake3_hash(payload)
}

/// Base64 text for QR symbols rendered in text mode.
pub fn encode_base64(payload: &[u8]) -> String {
    STANDARD.encode(payload)
}

/// Inverse of [`encode_base64`].
pub fn decode_base64(text: &str) -> Result<Vec<u8>, PayloadFormatError> {
    STANDARD
        .decode(text.trim())
        .map_err(|_| PayloadFormatError::InvalidBase64)
}

/// Normalize whatever the scanner produced into payload bytes.
///
/// Text that looks like base64 is decoded; anything else is taken as raw
/// symbol bytes and left for the layout decoder to judge.
pub fn from_scanned(raw: &[u8]) -> Cow<'_, [u8]> {
    let Ok(text) = std::str::from_utf8(raw) else {
        return Cow::Borrowed(raw);
    };
    let text = text.trim();
    let looks_like_base64 = !text.is_empty()
        && text.len() % 4 == 0
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
    if looks_like_base64 {
        if let Ok(decoded) = STANDARD.decode(text) {
            return Cow::Owned(decoded);
        }
    }
    Cow::Borrowed(raw)
}
