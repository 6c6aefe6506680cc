//! Error types for the transfer protocol.
//!
//! Every step of an exchange that can fail returns a [`TransferError`]. No
//! variant is returned after a partial mutation: shares, vouchers and
//! session state are only written once the step has fully succeeded.
//!
//! Each variant carries a [`UserAction`], so a UI can show one distinct,
//! actionable message per failure instead of a generic "something went
//! wrong".

use std::fmt;

use thiserror::Error;

use crate::crypto::encryption::EncryptionError;
use crate::crypto::keys::KeyError;
use crate::qr::PayloadFormatError;
use crate::sharing::ShareError;
use crate::storage::StoreError;

/// What the person holding the phone should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Reconnect to the market so the witness share can be fetched.
    Resync,
    /// Point the camera at the QR code again.
    Rescan,
    /// Try the same step again with fresh data.
    Retry,
    /// The offer is stale; show a new one.
    Regenerate,
    /// Nothing to do now; the event is queued and will be retried.
    RetryPublish,
    /// Nothing the user can do.
    None,
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserAction::Resync => "resync with your market",
            UserAction::Rescan => "scan the code again",
            UserAction::Retry => "try again",
            UserAction::Regenerate => "generate a new offer",
            UserAction::RetryPublish => "will retry when back online",
            UserAction::None => "no action possible",
        };
        f.write_str(s)
    }
}

/// Errors raised by issuance, donor and recipient sessions, and the device
/// adapter.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A key or share was not exactly 32 bytes.
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The carrier share or the cached witness share is not on this device.
    #[error("missing {0} share for this voucher")]
    MissingShare(&'static str),

    /// The witness share is neither cached nor retrievable from the network.
    #[error("witness share unavailable for this voucher")]
    MissingWitnessShare,

    /// An AES-GCM tag did not verify. Final for these inputs.
    #[error("authentication failure: sealed share did not open")]
    AuthenticationFailure,

    /// The transported share did not decrypt, or decrypted into a key that is
    /// not this voucher's. Final for this offer and witness share; a freshly
    /// synced witness share is a different input.
    #[error("tampered or wrong share: reconstructed key does not match the voucher")]
    TamperedOrWrongShare,

    /// An offer or acknowledgement signature did not verify.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(&'static str),

    /// The recipient answered with a declined status.
    #[error("recipient declined the offer")]
    OfferDeclined,

    /// Malformed or wrong-version QR payload.
    #[error("unreadable QR payload: {0}")]
    PayloadFormat(#[from] PayloadFormatError),

    /// Offer TTL has lapsed.
    #[error("offer expired at {expired_at}, processed at {now}")]
    OfferExpired { expired_at: u64, now: u64 },

    /// The witness network did not take the event. The commit still stands.
    #[error("witness publish failed: {0}")]
    PublishFailure(String),

    #[error("voucher {0} not found")]
    VoucherNotFound(String),

    #[error("voucher {0} is not active")]
    VoucherNotActive(String),

    #[error("voucher {0} has expired")]
    VoucherExpired(String),

    #[error("membership in market {0} has expired")]
    MarketExpired(String),

    /// No `K_market` configured on this device.
    #[error("no market key configured")]
    MissingMarketKey,

    /// A session method was called in the wrong state.
    #[error("unexpected state: in {current}, cannot {attempted}")]
    InvalidState {
        current: &'static str,
        attempted: &'static str,
    },

    /// The secret sharing engine itself failed, not the shares.
    #[error("secret sharing failed: {0}")]
    Sharing(String),

    /// Issuance was asked for an expiry past what a timestamp can hold.
    #[error("voucher lifetime of {0} days is out of range")]
    LifetimeOutOfRange(u32),

    /// A witness event could not be serialized.
    #[error("event encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl TransferError {
    /// The one thing the user should do about this error.
    pub fn user_action(&self) -> UserAction {
        match self {
            TransferError::MissingShare(_)
            | TransferError::MissingWitnessShare
            | TransferError::TamperedOrWrongShare
            | TransferError::MissingMarketKey => UserAction::Resync,
            TransferError::PayloadFormat(_) => UserAction::Rescan,
            TransferError::SignatureMismatch(_)
            | TransferError::OfferDeclined
            | TransferError::Sharing(_)
            | TransferError::Storage(_) => UserAction::Retry,
            TransferError::OfferExpired { .. } => UserAction::Regenerate,
            TransferError::PublishFailure(_) => UserAction::RetryPublish,
            TransferError::InvalidKeyLength(_)
            | TransferError::AuthenticationFailure
            | TransferError::LifetimeOutOfRange(_)
            | TransferError::Encoding(_)
            | TransferError::VoucherNotFound(_)
            | TransferError::VoucherNotActive(_)
            | TransferError::VoucherExpired(_)
            | TransferError::MarketExpired(_)
            | TransferError::InvalidState { .. } => UserAction::None,
        }
    }

    /// Whether trying the same step again can ever succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.user_action(), UserAction::None)
    }
}

impl From<ShareError> for TransferError {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::InvalidKeyLength(n) => TransferError::InvalidKeyLength(n),
            // Two shares of the same role, or two shares from different
            // splits, cannot rebuild this voucher's key.
            ShareError::DuplicateRole(_) | ShareError::Mismatched(_) => {
                TransferError::TamperedOrWrongShare
            }
            ShareError::Engine(msg) => TransferError::Sharing(msg),
        }
    }
}

/// Sealing only fails on a bad key, and opening only on a bad tag or
/// encoding. All of them mean the share cannot be used.
impl From<EncryptionError> for TransferError {
    fn from(_: EncryptionError) -> Self {
        TransferError::AuthenticationFailure
    }
}

impl From<KeyError> for TransferError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::InvalidSecretKeyLength(n) => TransferError::InvalidKeyLength(n),
            KeyError::InvalidPublicKey => PayloadFormatError::InvalidBonId.into(),
            KeyError::InvalidSignature => TransferError::SignatureMismatch("malformed signature"),
        }
    }
}
