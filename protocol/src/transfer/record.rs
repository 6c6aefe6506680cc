//! Transfer records, the donor's public note of a completed exchange.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TRANSFER_METHOD_QR;
use crate::crypto::keys::{BonId, BonPublicKey};
use crate::voucher::{Amount, Voucher};

use super::challenge::Challenge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Published as part of the commit.
    Completed,
    /// Published later from the outbox.
    CompletedOffline,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Completed => f.write_str("completed"),
            TransferStatus::CompletedOffline => f.write_str("completed_offline"),
        }
    }
}

/// Created by the donor only, after the acknowledgement verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub bon_id: BonId,
    /// Donor device identity.
    pub sender: BonPublicKey,
    /// The acknowledgement carries no recipient identity, so this is
    /// always `None` for QR transfers.
    pub receiver: Option<BonPublicKey>,
    pub amount: Amount,
    pub market: String,
    pub method: String,
    pub status: TransferStatus,
    /// Hex of the challenge the acknowledgement answered.
    pub challenge: String,
    pub committed_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn for_qr_transfer(
        voucher: &Voucher,
        sender: BonPublicKey,
        challenge: &Challenge,
        committed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            bon_id: voucher.bon_id,
            sender,
            receiver: None,
            amount: voucher.value,
            market: voucher.market.clone(),
            method: TRANSFER_METHOD_QR.to_string(),
            status: TransferStatus::Completed,
            challenge: hex::encode(challenge),
            committed_at,
        }
    }

    /// Same record, marked as published after the fact.
    pub fn offline(mut self) -> Self {
        self.status = TransferStatus::CompletedOffline;
        self
    }
}
