//! Markets: trading groups that share one symmetric key.
//!
//! A market is configuration, not state. The device adapter is handed a
//! [`Market`] value and passes its key explicitly to every seal/open call.

use std::fmt;

use chrono::{DateTime, Utc};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::hash::market_key_from_seed;

/// `K_market`. Protects witness shares and nothing else.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MarketKey([u8; 32]);

impl MarketKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the key from the seed members exchange out of band.
    pub fn from_seed(seed: &[u8]) -> Self {
        Self(*market_key_from_seed(seed))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MarketKey(***)")
    }
}

/// A trading group.
#[derive(Debug, Clone)]
pub struct Market {
    pub name: String,
    /// Witness relay endpoint, opaque to the protocol.
    pub relay: String,
    pub key: MarketKey,
    /// End of this device's membership. `None` means open-ended.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Market {
    pub fn new(name: impl Into<String>, relay: impl Into<String>, key: MarketKey) -> Self {
        Self {
            name: name.into(),
            relay: relay.into(),
            key,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}
