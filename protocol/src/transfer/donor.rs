//! # Donor Session
//!
//! The giving side of an exchange. Pure and synchronous: it never touches
//! storage or the network. The device adapter loads shares, hands them in,
//! and persists whatever the session decides.
//!
//! ```text
//!   Idle ─► OfferGenerating ─► OfferReady ─► AwaitingAck ─► Verifying ─► Committed
//!                ▲                 │  ▲            │            │
//!                └── regenerate ───┘  └── bad ack ─┴────────────┘
//! ```
//!
//! A failed acknowledgement check drops back to `OfferReady` with the same
//! offer on screen: the challenge stays valid, and the recipient can simply
//! show their code again. Regenerating always draws a new challenge.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::crypto::encryption::seal_share;
use crate::crypto::hash::share_transport_key;
use crate::qr::{AckPayload, AckStatus, OfferPayload, ProtocolVersion};
use crate::sharing::{with_ephemeral_key, SecretShare, ShareRole};
use crate::voucher::{Voucher, VoucherStatus};

use super::challenge::{unix_seconds, wire_timestamp, Challenge, ChallengeLog};
use super::error::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonorState {
    Idle,
    OfferGenerating,
    OfferReady,
    AwaitingAck,
    Verifying,
    Committed,
}

impl DonorState {
    pub fn name(self) -> &'static str {
        match self {
            DonorState::Idle => "Idle",
            DonorState::OfferGenerating => "OfferGenerating",
            DonorState::OfferReady => "OfferReady",
            DonorState::AwaitingAck => "AwaitingAck",
            DonorState::Verifying => "Verifying",
            DonorState::Committed => "Committed",
        }
    }
}

/// The acknowledgement checked out. Hand this to the commit step.
#[derive(Debug, Clone)]
pub struct AcceptedAck {
    pub ack: AckPayload,
    pub challenge: Challenge,
}

/// One voucher being given away.
pub struct DonorSession {
    id: Uuid,
    voucher: Voucher,
    version: ProtocolVersion,
    ttl_secs: u8,
    state: DonorState,
    offer: Option<OfferPayload>,
    encoded: Vec<u8>,
    challenges: ChallengeLog,
}

impl DonorSession {
    pub fn new(voucher: Voucher, config: &TransferConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            voucher,
            version: config.protocol_version,
            ttl_secs: config.offer_ttl_secs,
            state: DonorState::Idle,
            offer: None,
            encoded: Vec::new(),
            challenges: ChallengeLog::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> DonorState {
        self.state
    }

    pub fn voucher(&self) -> &Voucher {
        &self.voucher
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The offer currently on screen.
    pub fn offer(&self) -> Option<&OfferPayload> {
        self.offer.as_ref()
    }

    pub fn offer_bytes(&self) -> Option<&[u8]> {
        self.offer.as_ref().map(|_| self.encoded.as_slice())
    }

    /// True when there is no offer or the current one has lapsed.
    pub fn offer_expired(&self, now: DateTime<Utc>) -> bool {
        self.offer
            .as_ref()
            .map_or(true, |o| o.is_expired(unix_seconds(now)))
    }

    /// How many challenges this session has burned.
    pub fn challenges_issued(&self) -> usize {
        self.challenges.len()
    }

    /// Build, sign and encode a fresh offer.
    ///
    /// Also used to regenerate after expiry: every call draws a new
    /// challenge and produces new bytes. On error the session is left in the
    /// state it was in before the call.
    pub fn generate_offer(
        &mut self,
        carrier: &SecretShare,
        witness: &SecretShare,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, TransferError> {
        match self.state {
            DonorState::Idle | DonorState::OfferReady | DonorState::AwaitingAck => {}
            other => {
                return Err(TransferError::InvalidState {
                    current: other.name(),
                    attempted: "generate an offer",
                })
            }
        }

        let previous = self.state;
        self.state = DonorState::OfferGenerating;
        match self.build_offer(carrier, witness, now) {
            Ok((offer, bytes)) => {
                self.offer = Some(offer);
                self.encoded = bytes.clone();
                self.state = DonorState::OfferReady;
                Ok(bytes)
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    fn build_offer(
        &mut self,
        carrier: &SecretShare,
        witness: &SecretShare,
        now: DateTime<Utc>,
    ) -> Result<(OfferPayload, Vec<u8>), TransferError> {
        let label = self.voucher.bon_id.short();
        match self.voucher.status {
            VoucherStatus::Active | VoucherStatus::PendingTransfer => {}
            VoucherStatus::Spent => return Err(TransferError::VoucherNotActive(label)),
        }
        if self.voucher.is_expired(now) {
            return Err(TransferError::VoucherExpired(label));
        }
        if carrier.role() != ShareRole::Carrier {
            return Err(TransferError::MissingShare("carrier"));
        }
        if witness.role() != ShareRole::Witness {
            return Err(TransferError::MissingShare("witness"));
        }

        let bon_id = self.voucher.bon_id;
        let transport_key = share_transport_key(witness.as_bytes());
        let encrypted_carrier = seal_share(carrier.as_bytes(), &transport_key)?;
        let challenge = self.challenges.issue();
        let timestamp = wire_timestamp(now);

        let message =
            OfferPayload::signing_message(&bon_id, &encrypted_carrier, &challenge, timestamp);
        let signature = with_ephemeral_key(carrier, witness, |key| {
            if !key.matches(&bon_id) {
                return Err(TransferError::TamperedOrWrongShare);
            }
            Ok(key.sign(&message))
        })?;

        let issuer_name = match self.version {
            ProtocolVersion::V1 => String::new(),
            ProtocolVersion::V2 => self.voucher.issuer_name.clone(),
        };
        let offer = OfferPayload {
            version: self.version,
            bon_id,
            value: self.voucher.value,
            issuer: self.voucher.issuer,
            issuer_name,
            encrypted_carrier,
            challenge,
            signature,
            timestamp,
            ttl_secs: self.ttl_secs,
        };
        let bytes = offer.encode()?;
        Ok((offer, bytes))
    }

    /// The offer is on screen and the scanner is open.
    pub fn await_ack(&mut self) -> Result<(), TransferError> {
        match self.state {
            DonorState::OfferReady | DonorState::AwaitingAck => {
                self.state = DonorState::AwaitingAck;
                Ok(())
            }
            other => Err(TransferError::InvalidState {
                current: other.name(),
                attempted: "wait for an acknowledgement",
            }),
        }
    }

    /// Check a scanned acknowledgement against the current offer.
    ///
    /// On success the session stays in `Verifying` until [`commit`](Self::commit).
    /// On failure it returns to `OfferReady`; nothing about the current offer
    /// changes.
    pub fn verify_ack(&mut self, raw: &[u8]) -> Result<AcceptedAck, TransferError> {
        let offer = match (self.state, self.offer.as_ref()) {
            (DonorState::OfferReady | DonorState::AwaitingAck, Some(offer)) => offer.clone(),
            (other, _) => {
                return Err(TransferError::InvalidState {
                    current: other.name(),
                    attempted: "verify an acknowledgement",
                })
            }
        };

        self.state = DonorState::Verifying;
        let checked = Self::check_ack(&offer, raw);
        if checked.is_err() {
            self.state = DonorState::OfferReady;
        }
        checked
    }

    fn check_ack(offer: &OfferPayload, raw: &[u8]) -> Result<AcceptedAck, TransferError> {
        let ack = AckPayload::decode(raw, offer.version)?;
        if ack.bon_id != offer.bon_id {
            return Err(TransferError::SignatureMismatch(
                "acknowledgement is for a different voucher",
            ));
        }
        if ack.status != AckStatus::Accepted {
            return Err(TransferError::OfferDeclined);
        }
        if !ack.verify_challenge(&offer.challenge, offer.version) {
            return Err(TransferError::SignatureMismatch(
                "acknowledgement does not sign the current challenge",
            ));
        }
        Ok(AcceptedAck {
            ack,
            challenge: offer.challenge,
        })
    }

    /// Local share deletion is done. Terminal.
    pub fn commit(&mut self) -> Result<(), TransferError> {
        if self.state != DonorState::Verifying {
            return Err(TransferError::InvalidState {
                current: self.state.name(),
                attempted: "commit",
            });
        }
        self.state = DonorState::Committed;
        self.voucher.mark_spent();
        Ok(())
    }

    /// The commit could not be persisted. Back to the offer on screen.
    pub fn abort_commit(&mut self) {
        if self.state == DonorState::Verifying {
            self.state = DonorState::OfferReady;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::BonKeypair;
    use crate::qr::AckPayload;
    use crate::sharing::{split, EphemeralKey, ShareSet};
    use crate::voucher::{Amount, Rarity};
    use chrono::Duration;

    fn voucher_and_shares() -> (Voucher, ShareSet) {
        let key = BonKeypair::generate();
        let shares = split(key.secret_seed().as_slice()).unwrap();
        let bon_id = key.public_key();
        let voucher = Voucher {
            bon_id,
            value: Amount::from_centimes(500),
            issuer: BonKeypair::generate().public_key(),
            issuer_name: "Market Hall".into(),
            created_at: Utc::now(),
            expires_at: None,
            status: VoucherStatus::Active,
            market: "village".into(),
            carrier_share: Some(shares.carrier.clone()),
            category: String::new(),
            rarity: Rarity::for_bon(&bon_id),
        };
        (voucher, shares)
    }

    fn ack_for(shares: &ShareSet, offer: &OfferPayload, status: AckStatus) -> Vec<u8> {
        let key = EphemeralKey::reconstruct(&shares.carrier, &shares.witness).unwrap();
        AckPayload {
            bon_id: offer.bon_id,
            status,
            signature: key.sign(&offer.version.ack_message(&offer.challenge)),
        }
        .encode()
        .to_vec()
    }

    #[test]
    fn happy_path_reaches_committed() {
        let (voucher, shares) = voucher_and_shares();
        let mut s = DonorSession::new(voucher, &TransferConfig::default());
        assert_eq!(s.state(), DonorState::Idle);

        let bytes = s.generate_offer(&shares.carrier, &shares.witness, Utc::now()).unwrap();
        assert_eq!(s.state(), DonorState::OfferReady);
        let offer = OfferPayload::decode(&bytes, ProtocolVersion::V2).unwrap();
        assert!(offer.verify_signature());
        assert_eq!(offer.issuer_name, "Market Hall");

        s.await_ack().unwrap();
        let ack = ack_for(&shares, &offer, AckStatus::Accepted);
        let accepted = s.verify_ack(&ack).unwrap();
        assert_eq!(accepted.challenge, offer.challenge);
        assert_eq!(s.state(), DonorState::Verifying);

        s.commit().unwrap();
        assert_eq!(s.state(), DonorState::Committed);
        assert_eq!(s.voucher().status, VoucherStatus::Spent);
    }

    #[test]
    fn bad_ack_returns_to_offer_ready_without_consuming_challenge() {
        let (voucher, shares) = voucher_and_shares();
        let mut s = DonorSession::new(voucher, &TransferConfig::default());
        s.generate_offer(&shares.carrier, &shares.witness, Utc::now()).unwrap();
        s.await_ack().unwrap();
        let offer = s.offer().unwrap().clone();

        // Signed by someone who does not hold the voucher key.
        let forged = AckPayload {
            bon_id: offer.bon_id,
            status: AckStatus::Accepted,
            signature: BonKeypair::generate().sign(&offer.version.ack_message(&offer.challenge)),
        }
        .encode();
        assert!(matches!(
            s.verify_ack(&forged),
            Err(TransferError::SignatureMismatch(_))
        ));
        assert_eq!(s.state(), DonorState::OfferReady);
        assert_eq!(s.offer().unwrap().challenge, offer.challenge);

        // The genuine ack for the same challenge still goes through.
        let ack = ack_for(&shares, &offer, AckStatus::Accepted);
        assert!(s.verify_ack(&ack).is_ok());
    }

    #[test]
    fn garbage_and_declined_acks_are_retryable() {
        let (voucher, shares) = voucher_and_shares();
        let mut s = DonorSession::new(voucher, &TransferConfig::default());
        s.generate_offer(&shares.carrier, &shares.witness, Utc::now()).unwrap();
        let offer = s.offer().unwrap().clone();

        let err = s.verify_ack(&[0u8; 12]).unwrap_err();
        assert!(matches!(err, TransferError::PayloadFormat(_)));
        assert!(err.is_retryable());

        let declined = ack_for(&shares, &offer, AckStatus::Declined);
        assert!(matches!(s.verify_ack(&declined), Err(TransferError::OfferDeclined)));
        assert_eq!(s.state(), DonorState::OfferReady);
    }

    #[test]
    fn v1_ack_does_not_satisfy_a_v2_offer() {
        let (voucher, shares) = voucher_and_shares();
        let mut s = DonorSession::new(voucher, &TransferConfig::default());
        s.generate_offer(&shares.carrier, &shares.witness, Utc::now()).unwrap();
        let mut offer = s.offer().unwrap().clone();
        offer.version = ProtocolVersion::V1;
        let v1_ack = ack_for(&shares, &offer, AckStatus::Accepted);
        assert!(s.verify_ack(&v1_ack).is_err());
    }

    #[test]
    fn regeneration_draws_a_new_challenge() {
        let (voucher, shares) = voucher_and_shares();
        let mut s = DonorSession::new(voucher, &TransferConfig::default());
        let now = Utc::now();
        let first = s.generate_offer(&shares.carrier, &shares.witness, now).unwrap();
        let c1 = s.offer().unwrap().challenge;
        assert!(!s.offer_expired(now));
        assert!(s.offer_expired(now + Duration::seconds(31)));

        let second = s
            .generate_offer(&shares.carrier, &shares.witness, now + Duration::seconds(31))
            .unwrap();
        let c2 = s.offer().unwrap().challenge;
        assert_ne!(first, second);
        assert_ne!(c1, c2);
        assert_eq!(s.challenges_issued(), 2);
    }

    #[test]
    fn foreign_shares_are_refused_before_anything_is_shown() {
        let (voucher, _) = voucher_and_shares();
        let (_, other) = voucher_and_shares();
        let mut s = DonorSession::new(voucher, &TransferConfig::default());
        assert!(matches!(
            s.generate_offer(&other.carrier, &other.witness, Utc::now()),
            Err(TransferError::TamperedOrWrongShare)
        ));
        assert_eq!(s.state(), DonorState::Idle);
        assert!(s.offer().is_none());
    }

    #[test]
    fn expired_voucher_cannot_be_offered() {
        let (mut voucher, shares) = voucher_and_shares();
        voucher.expires_at = Some(Utc::now() - Duration::days(1));
        let mut s = DonorSession::new(voucher, &TransferConfig::default());
        assert!(matches!(
            s.generate_offer(&shares.carrier, &shares.witness, Utc::now()),
            Err(TransferError::VoucherExpired(_))
        ));
    }

    #[test]
    fn v1_offers_have_fixed_length() {
        let (voucher, shares) = voucher_and_shares();
        let config = TransferConfig {
            protocol_version: ProtocolVersion::V1,
            ..TransferConfig::default()
        };
        let mut s = DonorSession::new(voucher, &config);
        let bytes = s.generate_offer(&shares.carrier, &shares.witness, Utc::now()).unwrap();
        assert_eq!(bytes.len(), 213);
    }

    #[test]
    fn commit_requires_verification() {
        let (voucher, _) = voucher_and_shares();
        let mut s = DonorSession::new(voucher, &TransferConfig::default());
        assert!(matches!(s.commit(), Err(TransferError::InvalidState { .. })));
    }
}
