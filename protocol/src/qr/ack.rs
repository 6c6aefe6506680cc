//! Acknowledgement payload: recipient → donor.
//!
//! `bonId 32 | status 1 | signature 64`, always 97 bytes. The signature is
//! made with the recipient's reconstructed voucher key over
//! [`ProtocolVersion::ack_message`].

use std::fmt;

use serde::Serialize;

use crate::config::{ACK_PAYLOAD_LENGTH, CHALLENGE_LENGTH, PUBLIC_KEY_LENGTH};
use crate::crypto::keys::{BonId, BonPublicKey, BonSignature};
use crate::crypto::verify;

use super::{PayloadFormatError, ProtocolVersion};

/// Recipient's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Accepted,
    Declined,
}

impl AckStatus {
    pub fn to_byte(self) -> u8 {
        match self {
            AckStatus::Accepted => 0x01,
            AckStatus::Declined => 0x02,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, PayloadFormatError> {
        match byte {
            0x01 => Ok(AckStatus::Accepted),
            0x02 => Ok(AckStatus::Declined),
            other => Err(PayloadFormatError::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckStatus::Accepted => f.write_str("accepted"),
            AckStatus::Declined => f.write_str("declined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AckPayload {
    pub bon_id: BonId,
    pub status: AckStatus,
    pub signature: BonSignature,
}

impl AckPayload {
    pub fn encode(&self) -> [u8; ACK_PAYLOAD_LENGTH] {
        let mut out = [0u8; ACK_PAYLOAD_LENGTH];
        out[..PUBLIC_KEY_LENGTH].copy_from_slice(self.bon_id.as_bytes());
        out[PUBLIC_KEY_LENGTH] = self.status.to_byte();
        out[PUBLIC_KEY_LENGTH + 1..].copy_from_slice(self.signature.as_bytes());
        out
    }

    /// The ack layout is the same in every version; `version` only shows up
    /// in the error.
    pub fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self, PayloadFormatError> {
        if bytes.len() != ACK_PAYLOAD_LENGTH {
            return Err(PayloadFormatError::WrongLength {
                kind: "acknowledgement",
                version,
                expected: ACK_PAYLOAD_LENGTH,
                got: bytes.len(),
            });
        }
        let (id, rest) = bytes.split_at(PUBLIC_KEY_LENGTH);
        let (status, sig) = rest.split_at(1);

        let bon_id =
            BonPublicKey::try_from_slice(id).map_err(|_| PayloadFormatError::InvalidBonId)?;
        let status = AckStatus::from_byte(status[0])?;
        let signature = BonSignature::try_from_slice(sig).map_err(|_| {
            PayloadFormatError::WrongLength {
                kind: "acknowledgement",
                version,
                expected: ACK_PAYLOAD_LENGTH,
                got: bytes.len(),
            }
        })?;

        Ok(Self {
            bon_id,
            status,
            signature,
        })
    }

    /// Does the signature cover `challenge` under `bonId` for `version`?
    pub fn verify_challenge(
        &self,
        challenge: &[u8; CHALLENGE_LENGTH],
        version: ProtocolVersion,
    ) -> bool {
        verify(&version.ack_message(challenge), &self.signature, &self.bon_id)
    }
}
