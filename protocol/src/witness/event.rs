//! Signed witness events.
//!
//! An event is what a device posts to the relay network. Two kinds exist:
//!
//! - `ShareDistribution`: the witness share of a freshly minted voucher,
//!   sealed under `K_market`, tagged with its `bonId`.
//! - `TransferRecord`: the donor's public note that a voucher changed hands.
//!
//! The event id is BLAKE3 over a canonical JSON array of every other field,
//! and the author signs the id. Relays check both before accepting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::crypto::encryption::EncryptedShare;
use crate::crypto::hash::blake3_hash;
use crate::crypto::keys::{BonId, BonKeypair, BonPublicKey, BonSignature};
use crate::transfer::TransferRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WitnessEventKind {
    ShareDistribution,
    TransferRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessEvent {
    /// Hex BLAKE3 of the canonical payload.
    pub id: String,
    pub kind: WitnessEventKind,
    pub bon_id: BonId,
    pub market: String,
    /// Device identity that signed the event.
    pub author: BonPublicKey,
    pub created_at: DateTime<Utc>,
    pub content: Value,
    pub signature: BonSignature,
}

impl WitnessEvent {
    /// Publish a sealed witness share.
    pub fn share_distribution(
        author: &BonKeypair,
        market: &str,
        bon_id: BonId,
        sealed: &EncryptedShare,
        created_at: DateTime<Utc>,
    ) -> Self {
        let content = json!({ "share": hex::encode(sealed.to_bytes()) });
        Self::signed(
            author,
            WitnessEventKind::ShareDistribution,
            market,
            bon_id,
            content,
            created_at,
        )
    }

    /// Publish a transfer record.
    pub fn transfer_record(
        author: &BonKeypair,
        record: &TransferRecord,
        created_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let content = serde_json::to_value(record)?;
        Ok(Self::signed(
            author,
            WitnessEventKind::TransferRecord,
            &record.market,
            record.bon_id,
            content,
            created_at,
        ))
    }

    fn signed(
        author: &BonKeypair,
        kind: WitnessEventKind,
        market: &str,
        bon_id: BonId,
        content: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        let author_pk = author.public_key();
        let id = Self::compute_id(kind, market, &bon_id, &author_pk, &created_at, &content);
        let signature = author.sign(&id);
        Self {
            id: hex::encode(id),
            kind,
            bon_id,
            market: market.to_string(),
            author: author_pk,
            created_at,
            content,
            signature,
        }
    }

    fn compute_id(
        kind: WitnessEventKind,
        market: &str,
        bon_id: &BonId,
        author: &BonPublicKey,
        created_at: &DateTime<Utc>,
        content: &Value,
    ) -> [u8; 32] {
        let canonical = json!([
            0,
            author.to_hex(),
            created_at.timestamp(),
            kind,
            bon_id.to_hex(),
            market,
            content,
        ]);
        blake3_hash(canonical.to_string().as_bytes())
    }

    /// Id matches the content and the author signed it.
    pub fn verify(&self) -> bool {
        let id = Self::compute_id(
            self.kind,
            &self.market,
            &self.bon_id,
            &self.author,
            &self.created_at,
            &self.content,
        );
        hex::encode(id) == self.id && self.author.verify(&id, &self.signature)
    }

    /// The sealed share carried by a `ShareDistribution` event.
    pub fn sealed_share(&self) -> Option<EncryptedShare> {
        if self.kind != WitnessEventKind::ShareDistribution {
            return None;
        }
        let hex_str = self.content.get("share")?.as_str()?;
        let bytes = hex::decode(hex_str).ok()?;
        EncryptedShare::from_bytes(&bytes).ok()
    }

    /// The record carried by a `TransferRecord` event.
    pub fn transfer(&self) -> Option<TransferRecord> {
        if self.kind != WitnessEventKind::TransferRecord {
            return None;
        }
        serde_json::from_value(self.content.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encryption::seal_share;
    use crate::transfer::TransferStatus;
    use crate::voucher::Amount;

    fn event() -> (WitnessEvent, EncryptedShare) {
        let author = BonKeypair::generate();
        let bon = BonKeypair::generate().public_key();
        let sealed = seal_share(&[4; 32], &[5; 32]).unwrap();
        let ev = WitnessEvent::share_distribution(&author, "village", bon, &sealed, Utc::now());
        (ev, sealed)
    }

    #[test]
    fn fresh_events_verify() {
        let (ev, sealed) = event();
        assert!(ev.verify());
        assert_eq!(ev.sealed_share(), Some(sealed));
        assert!(ev.transfer().is_none());
    }

    #[test]
    fn edited_content_fails_verification() {
        let (mut ev, _) = event();
        ev.market = "elsewhere".into();
        assert!(!ev.verify());
    }

    #[test]
    fn forged_author_fails_verification() {
        let (mut ev, _) = event();
        ev.author = BonKeypair::generate().public_key();
        assert!(!ev.verify());
    }

    #[test]
    fn transfer_records_carry_their_record() {
        let author = BonKeypair::generate();
        let record = TransferRecord {
            bon_id: BonKeypair::generate().public_key(),
            sender: author.public_key(),
            receiver: None,
            amount: Amount::from_centimes(250),
            market: "village".into(),
            method: "qr".into(),
            status: TransferStatus::Completed,
            challenge: "00".repeat(16),
            committed_at: Utc::now(),
        };
        let ev = WitnessEvent::transfer_record(&author, &record, Utc::now()).unwrap();
        assert!(ev.verify());
        assert_eq!(ev.kind, WitnessEventKind::TransferRecord);
        assert_eq!(ev.market, "village");
        assert_eq!(ev.transfer(), Some(record));
        assert!(ev.sealed_share().is_none());
    }

    #[test]
    fn events_survive_json() {
        let (ev, _) = event();
        let json = serde_json::to_string(&ev).unwrap();
        let back: WitnessEvent = serde_json::from_str(&json).unwrap();
        assert!(back.verify());
        assert_eq!(back, ev);
    }
}
