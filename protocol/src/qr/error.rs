//! Decode errors for QR payloads.
//!
//! Every malformed payload maps to one of these. None of them is a panic and
//! none of them is fatal to the session: the user rescans.

use thiserror::Error;

use super::ProtocolVersion;

/// A QR payload that cannot be used as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadFormatError {
    /// Length does not match the layout of the version in use.
    #[error("{kind} payload for {version} must be {expected} bytes, got {got}")]
    WrongLength {
        kind: &'static str,
        version: ProtocolVersion,
        expected: usize,
        got: usize,
    },

    /// Too short to even read the variable-length header.
    #[error("{kind} payload for {version} needs at least {minimum} bytes, got {got}")]
    TooShort {
        kind: &'static str,
        version: ProtocolVersion,
        minimum: usize,
        got: usize,
    },

    #[error("bonId is not a valid Ed25519 public key")]
    InvalidBonId,

    #[error("issuer key is not a valid Ed25519 public key")]
    InvalidIssuerKey,

    #[error("issuer name is not valid UTF-8")]
    InvalidIssuerName,

    #[error("issuer name is {0} bytes; the limit is 64")]
    IssuerNameTooLong(usize),

    /// The layout has no issuer name field.
    #[error("{0} offers cannot carry an issuer name")]
    IssuerNameNotSupported(ProtocolVersion),

    #[error("unknown acknowledgement status byte {0:#04x}")]
    UnknownStatus(u8),

    #[error("QR text is not valid base64")]
    InvalidBase64,
}
