//! # Vouchers
//!
//! The bearer instrument itself, plus the market it circulates in.
//!
//! ```text
//! mod.rs       — Voucher, Amount, VoucherStatus, Rarity
//! market.rs    — Market, MarketKey (K_market derived from a shared seed)
//! issuance.rs  — minting: keypair, split, seal the witness share
//! ```
//!
//! ## Amounts
//!
//! Values are whole centimes in a `u32`, because that is what the offer QR
//! carries (4 bytes, big endian). No floating point anywhere; decimal
//! strings are parsed and printed by [`Amount`].
//!
//! ## Expiry
//!
//! Issuer-minted vouchers expire so that money keeps circulating instead of
//! being hoarded. The moment a voucher changes hands its expiry is dropped:
//! a recipient never inherits the issuer's deadline.

pub mod issuance;
pub mod market;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::keys::{BonId, BonPublicKey};
use crate::sharing::SecretShare;

pub use issuance::{issue_voucher, IssuedVoucher, IssueRequest};
pub use market::{Market, MarketKey};

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// Errors parsing a decimal amount.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("not a decimal amount: {0:?}")]
    Malformed(String),

    #[error("at most two decimal places are allowed: {0:?}")]
    TooPrecise(String),

    #[error("amount does not fit in 32-bit centimes: {0:?}")]
    Overflow(String),
}

/// A voucher value in centimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u32);

impl Amount {
    pub const fn from_centimes(centimes: u32) -> Self {
        Self(centimes)
    }

    pub const fn centimes(self) -> u32 {
        self.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses `"12"`, `"12.5"` and `"12.50"`. No signs, no exponents.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AmountError::Malformed(s.to_string());
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) || (s.contains('.') && frac.is_empty()) {
            return Err(malformed());
        }
        if frac.len() > 2 {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let overflow = || AmountError::Overflow(s.to_string());
        let whole: u32 = whole.parse().map_err(|_| overflow())?;
        let frac: u32 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u32>().map_err(|_| malformed())? * 10,
            _ => frac.parse().map_err(|_| malformed())?,
        };
        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .map(Amount)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ---------------------------------------------------------------------------
// Status & classification
// ---------------------------------------------------------------------------

/// Where a voucher is in its local lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    /// Held and spendable.
    Active,
    /// An offer for it is on screen.
    PendingTransfer,
    /// Given away. Terminal on this device.
    Spent,
}

impl fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::PendingTransfer => write!(f, "pending"),
            Self::Spent => write!(f, "spent"),
        }
    }
}

/// Cosmetic rarity tier. Derived from the `bonId`, so every device that sees
/// a voucher agrees on it without it ever being transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl Rarity {
    pub fn for_bon(bon_id: &BonId) -> Self {
        match bon_id.as_bytes()[0] {
            0..=179 => Rarity::Common,
            180..=229 => Rarity::Uncommon,
            230..=251 => Rarity::Rare,
            _ => Rarity::Legendary,
        }
    }
}

// ---------------------------------------------------------------------------
// Voucher
// ---------------------------------------------------------------------------

/// A voucher as one device sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    /// Public key of the voucher keypair. Permanent identifier.
    pub bon_id: BonId,
    pub value: Amount,
    /// Issuer's device identity key.
    pub issuer: BonPublicKey,
    pub issuer_name: String,
    pub created_at: DateTime<Utc>,
    /// `None` once the voucher has changed hands.
    pub expires_at: Option<DateTime<Utc>>,
    pub status: VoucherStatus,
    pub market: String,
    /// The share that makes this device the holder. `None` after sending.
    pub carrier_share: Option<SecretShare>,
    pub category: String,
    pub rarity: Rarity,
}

impl Voucher {
    /// Build the local record for a voucher just received in a transfer.
    ///
    /// Status is `Active` and the expiry is cleared.
    #[allow(clippy::too_many_arguments)]
    pub fn received(
        bon_id: BonId,
        value: Amount,
        issuer: BonPublicKey,
        issuer_name: String,
        market: String,
        carrier_share: SecretShare,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            bon_id,
            value,
            issuer,
            issuer_name,
            created_at: received_at,
            expires_at: None,
            status: VoucherStatus::Active,
            market,
            carrier_share: Some(carrier_share),
            category: String::new(),
            rarity: Rarity::for_bon(&bon_id),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Active, unexpired, and still carrying its share.
    pub fn is_spendable(&self, now: DateTime<Utc>) -> bool {
        self.status == VoucherStatus::Active
            && !self.is_expired(now)
            && self.carrier_share.is_some()
    }

    /// Terminal local transition after a verified transfer.
    pub fn mark_spent(&mut self) {
        self.status = VoucherStatus::Spent;
        self.carrier_share = None;
    }
}
