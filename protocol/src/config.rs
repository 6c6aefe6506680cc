//! # Protocol Configuration & Constants
//!
//! Every magic number in Bon lives here. The byte lengths in the first
//! section are part of the QR wire contract: two devices running different
//! builds must agree on them bit for bit, so they are not tunables.
//!
//! The runtime knobs (offer lifetime, grace period, publish timeout) are
//! collected in [`TransferConfig`], which callers pass explicitly into the
//! device adapter. Nothing in the protocol reads ambient global state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::qr::ProtocolVersion;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 secret seed length. The voucher private key is exactly this long,
/// and so is every share derived from it.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Ed25519 public key length. A voucher's `bonId` is its public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// One share per byte of secret, so shares are also 32 bytes.
pub const SHARE_LENGTH: usize = SECRET_KEY_LENGTH;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length. Twelve bytes, as NIST intended.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Challenge length. 128 bits of fresh randomness per offer attempt.
pub const CHALLENGE_LENGTH: usize = 16;

/// BLAKE3 `derive_key` context for turning a market seed into `K_market`.
/// Changing this string forks every market in existence.
pub const MARKET_KEY_CONTEXT: &str = "bon market key v1";

// ---------------------------------------------------------------------------
// QR Payload Limits
// ---------------------------------------------------------------------------

/// Longest issuer display name carried in a V2 offer, in UTF-8 bytes.
/// QR density degrades quickly past ~300 bytes, and a shop name does not
/// need more than this.
pub const MAX_ISSUER_NAME_LENGTH: usize = 64;

/// Acknowledgement payload length: bonId + status + signature.
pub const ACK_PAYLOAD_LENGTH: usize = PUBLIC_KEY_LENGTH + 1 + SIGNATURE_LENGTH;

// ---------------------------------------------------------------------------
// Timing Defaults
// ---------------------------------------------------------------------------

/// Default offer lifetime. Long enough to point a phone at another phone,
/// short enough that a photographed QR is useless by the time it is replayed.
pub const DEFAULT_OFFER_TTL_SECS: u8 = 30;

/// How long the recipient waits after displaying its acknowledgement before
/// it optimistically reports success. Nothing in the protocol tells the
/// recipient that the donor actually scanned it.
pub const DEFAULT_SUCCESS_GRACE: Duration = Duration::from_secs(3);

/// Upper bound on a single witness publish attempt before the event is
/// parked in the outbox.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Issuer-minted vouchers expire after this many days to keep money moving.
/// Vouchers that have changed hands carry no expiry at all.
pub const DEFAULT_ISSUED_VOUCHER_LIFETIME_DAYS: u32 = 365;

/// Transfer method label written into witness transfer records.
pub const TRANSFER_METHOD_QR: &str = "qr";

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Tunables for a device's transfer sessions.
///
/// Deserializable so the CLI (and any embedding app) can load it from a
/// JSON file; every field has a default so partial files work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Offer lifetime embedded in every generated offer, in seconds.
    pub offer_ttl_secs: u8,
    /// Recipient grace period before `TimedSuccess`, in milliseconds.
    pub success_grace_ms: u64,
    /// Timeout for one witness publish attempt, in milliseconds.
    pub publish_timeout_ms: u64,
    /// Lifetime of freshly issued vouchers, in days.
    pub issued_voucher_lifetime_days: u32,
    /// Offer layout generated by donors and expected by recipients.
    pub protocol_version: ProtocolVersion,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            offer_ttl_secs: DEFAULT_OFFER_TTL_SECS,
            success_grace_ms: DEFAULT_SUCCESS_GRACE.as_millis() as u64,
            publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT.as_millis() as u64,
            issued_voucher_lifetime_days: DEFAULT_ISSUED_VOUCHER_LIFETIME_DAYS,
            protocol_version: ProtocolVersion::V2,
        }
    }
}

impl TransferConfig {
    /// Grace period as a `Duration`.
    pub fn success_grace(&self) -> Duration {
        Duration::from_millis(self.success_grace_ms)
    }

    /// Publish timeout as a `Duration`.
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_length_is_97() {
        assert_eq!(ACK_PAYLOAD_LENGTH, 97);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: TransferConfig = serde_json::from_str(r#"{ "offer_ttl_secs": 10 }"#).unwrap();
        assert_eq!(cfg.offer_ttl_secs, 10);
        assert_eq!(cfg.protocol_version, ProtocolVersion::V2);
        assert_eq!(cfg.success_grace(), DEFAULT_SUCCESS_GRACE);
    }
}
