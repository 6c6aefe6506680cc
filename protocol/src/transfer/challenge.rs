//! Challenges and offer timestamps.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::config::CHALLENGE_LENGTH;

pub type Challenge = [u8; CHALLENGE_LENGTH];

/// Every challenge a donor session has ever put in an offer.
///
/// A challenge is consumed the moment it is issued, whether or not the offer
/// is ever scanned, and is never handed out again.
#[derive(Debug, Default)]
pub struct ChallengeLog {
    issued: HashSet<Challenge>,
}

impl ChallengeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh random challenge, recorded as issued.
    pub fn issue(&mut self) -> Challenge {
        loop {
            let mut challenge = [0u8; CHALLENGE_LENGTH];
            rand::rngs::OsRng.fill_bytes(&mut challenge);
            if self.issued.insert(challenge) {
                return challenge;
            }
        }
    }

    pub fn was_issued(&self, challenge: &Challenge) -> bool {
        self.issued.contains(challenge)
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

/// Offer timestamps are 32-bit unix seconds. Times outside that range are
/// clamped, which only matters for clocks set before 1970 or after 2106.
pub fn wire_timestamp(now: DateTime<Utc>) -> u32 {
    now.timestamp().clamp(0, i64::from(u32::MAX)) as u32
}

/// `now` as unix seconds for TTL comparisons.
pub fn unix_seconds(now: DateTime<Utc>) -> u64 {
    now.timestamp().max(0) as u64
}
