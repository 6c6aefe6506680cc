//! Offer payload: donor → recipient.
//!
//! ```text
//! V2:  bonId 32 | value 4 BE | issuer 32 | nameLen 1 | name ≤64
//!      | ciphertext 32 | nonce 12 | tag 16 | challenge 16
//!      | signature 64 | timestamp 4 BE | ttl 1
//! V1:  same, without nameLen and name (213 bytes)
//! ```

use serde::Serialize;

use crate::config::{
    AES_NONCE_LENGTH, AES_TAG_LENGTH, CHALLENGE_LENGTH, MAX_ISSUER_NAME_LENGTH,
    PUBLIC_KEY_LENGTH, SHARE_LENGTH, SIGNATURE_LENGTH,
};
use crate::crypto::encryption::EncryptedShare;
use crate::crypto::keys::{BonId, BonPublicKey, BonSignature};
use crate::crypto::verify;
use crate::voucher::Amount;

use super::{PayloadFormatError, ProtocolVersion};

/// Fixed part shared by both versions.
const FIXED_LENGTH: usize = PUBLIC_KEY_LENGTH
    + 4
    + PUBLIC_KEY_LENGTH
    + SHARE_LENGTH
    + AES_NONCE_LENGTH
    + AES_TAG_LENGTH
    + CHALLENGE_LENGTH
    + SIGNATURE_LENGTH
    + 4
    + 1;

/// Exact length of every V1 offer.
pub const OFFER_V1_LENGTH: usize = FIXED_LENGTH;

/// Length of a V2 offer with an empty issuer name.
pub const OFFER_V2_MIN_LENGTH: usize = FIXED_LENGTH + 1;

/// Byte offset of the V2 name-length prefix.
const NAME_LENGTH_OFFSET: usize = PUBLIC_KEY_LENGTH + 4 + PUBLIC_KEY_LENGTH;

/// A decoded (or about-to-be-encoded) offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfferPayload {
    pub version: ProtocolVersion,
    pub bon_id: BonId,
    pub value: Amount,
    pub issuer: BonPublicKey,
    /// Always empty for V1.
    pub issuer_name: String,
    /// Carrier share sealed under `SHA-256(witness share)`.
    pub encrypted_carrier: EncryptedShare,
    #[serde(with = "hex_challenge")]
    pub challenge: [u8; CHALLENGE_LENGTH],
    pub signature: BonSignature,
    /// Unix seconds at generation.
    pub timestamp: u32,
    pub ttl_secs: u8,
}

impl OfferPayload {
    /// Bytes covered by the offer signature:
    /// `bonId || ciphertext || nonce || challenge || timestamp`.
    pub fn signing_message(
        bon_id: &BonId,
        encrypted_carrier: &EncryptedShare,
        challenge: &[u8; CHALLENGE_LENGTH],
        timestamp: u32,
    ) -> Vec<u8> {
        let mut msg = Vec::with_capacity(
            PUBLIC_KEY_LENGTH + SHARE_LENGTH + AES_NONCE_LENGTH + CHALLENGE_LENGTH + 4,
        );
        msg.extend_from_slice(bon_id.as_bytes());
        msg.extend_from_slice(&encrypted_carrier.ciphertext);
        msg.extend_from_slice(&encrypted_carrier.nonce);
        msg.extend_from_slice(challenge);
        msg.extend_from_slice(&timestamp.to_be_bytes());
        msg
    }

    /// Does the signature verify under `bonId`? Only the reconstructed
    /// voucher key can produce one that does.
    pub fn verify_signature(&self) -> bool {
        let msg = Self::signing_message(
            &self.bon_id,
            &self.encrypted_carrier,
            &self.challenge,
            self.timestamp,
        );
        verify(&msg, &self.signature, &self.bon_id)
    }

    /// Last second at which the offer is still valid.
    pub fn expires_at(&self) -> u64 {
        u64::from(self.timestamp) + u64::from(self.ttl_secs)
    }

    /// `now > timestamp + ttl`.
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs > self.expires_at()
    }

    /// Encoded size of this offer in its own version's layout.
    pub fn encoded_len(&self) -> usize {
        match self.version {
            ProtocolVersion::V1 => OFFER_V1_LENGTH,
            ProtocolVersion::V2 => OFFER_V2_MIN_LENGTH + self.issuer_name.len(),
        }
    }

    /// Serialize to QR bytes. A V1 offer must have an empty issuer name;
    /// the layout has no room for one.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadFormatError> {
        match self.version {
            ProtocolVersion::V1 if !self.issuer_name.is_empty() => {
                return Err(PayloadFormatError::IssuerNameNotSupported(self.version));
            }
            ProtocolVersion::V2 if self.issuer_name.len() > MAX_ISSUER_NAME_LENGTH => {
                return Err(PayloadFormatError::IssuerNameTooLong(self.issuer_name.len()));
            }
            _ => {}
        }

        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(self.bon_id.as_bytes());
        out.extend_from_slice(&self.value.centimes().to_be_bytes());
        out.extend_from_slice(self.issuer.as_bytes());
        if self.version == ProtocolVersion::V2 {
            // Length checked above, fits in a byte.
            out.push(self.issuer_name.len() as u8);
            out.extend_from_slice(self.issuer_name.as_bytes());
        }
        out.extend_from_slice(&self.encrypted_carrier.ciphertext);
        out.extend_from_slice(&self.encrypted_carrier.nonce);
        out.extend_from_slice(&self.encrypted_carrier.tag);
        out.extend_from_slice(&self.challenge);
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.push(self.ttl_secs);
        Ok(out)
    }

    /// Parse QR bytes laid out for `version`. The length must match exactly.
    pub fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self, PayloadFormatError> {
        let name_len = match version {
            ProtocolVersion::V1 => {
                if bytes.len() != OFFER_V1_LENGTH {
                    return Err(PayloadFormatError::WrongLength {
                        kind: "offer",
                        version,
                        expected: OFFER_V1_LENGTH,
                        got: bytes.len(),
                    });
                }
                0
            }
            ProtocolVersion::V2 => {
                if bytes.len() < OFFER_V2_MIN_LENGTH {
                    return Err(PayloadFormatError::TooShort {
                        kind: "offer",
                        version,
                        minimum: OFFER_V2_MIN_LENGTH,
                        got: bytes.len(),
                    });
                }
                let name_len = usize::from(bytes[NAME_LENGTH_OFFSET]);
                if name_len > MAX_ISSUER_NAME_LENGTH {
                    return Err(PayloadFormatError::IssuerNameTooLong(name_len));
                }
                let expected = OFFER_V2_MIN_LENGTH + name_len;
                if bytes.len() != expected {
                    return Err(PayloadFormatError::WrongLength {
                        kind: "offer",
                        version,
                        expected,
                        got: bytes.len(),
                    });
                }
                name_len
            }
        };

        let mut r = Reader::new(bytes);
        let bon_id = BonPublicKey::from_bytes(r.array()?)
            .map_err(|_| PayloadFormatError::InvalidBonId)?;
        let value = Amount::from_centimes(u32::from_be_bytes(r.array()?));
        let issuer = BonPublicKey::from_bytes(r.array()?)
            .map_err(|_| PayloadFormatError::InvalidIssuerKey)?;
        let issuer_name = match version {
            ProtocolVersion::V1 => String::new(),
            ProtocolVersion::V2 => {
                r.skip(1)?;
                let raw = r.bytes(name_len)?;
                std::str::from_utf8(raw)
                    .map_err(|_| PayloadFormatError::InvalidIssuerName)?
                    .to_string()
            }
        };
        let encrypted_carrier = EncryptedShare {
            ciphertext: r.array()?,
            nonce: r.array()?,
            tag: r.array()?,
        };
        let challenge = r.array()?;
        let signature = BonSignature::from_bytes(r.array()?);
        let timestamp = u32::from_be_bytes(r.array()?);
        let [ttl_secs] = r.array()?;

        Ok(Self {
            version,
            bon_id,
            value,
            issuer,
            issuer_name,
            encrypted_carrier,
            challenge,
            signature,
            timestamp,
            ttl_secs,
        })
    }
}

/// Bounds-checked cursor over a payload. The length is validated before
/// reading starts, so running off the end means the layout constants are
/// wrong, not the input; it is still an error rather than a panic.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], PayloadFormatError> {
        let end = self.pos + n;
        let slice = self.buf.get(self.pos..end).ok_or(PayloadFormatError::TooShort {
            kind: "offer",
            version: ProtocolVersion::V2,
            minimum: end,
            got: self.buf.len(),
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), PayloadFormatError> {
        self.bytes(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PayloadFormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }
}

mod hex_challenge {
    use serde::Serializer;

    use crate::config::CHALLENGE_LENGTH;

    pub fn serialize<S: Serializer>(c: &[u8; CHALLENGE_LENGTH], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(c))
    }
}
