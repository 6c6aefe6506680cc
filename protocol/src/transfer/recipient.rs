//! # Recipient Session
//!
//! The receiving side of an exchange.
//!
//! ```text
//!   Idle ─► ScanningOffer ─► ProcessingOffer ─► AckReady ─► TimedSuccess
//!                 ▲                 │
//!                 └──── error ──────┘
//! ```
//!
//! Processing is split in two because the witness share may have to come
//! from the network:
//!
//! 1. [`begin`](RecipientSession::begin) decodes the offer and checks what
//!    can be checked without secrets: the fingerprint, the signature under
//!    `bonId`, and the TTL.
//! 2. [`complete`](RecipientSession::complete) takes the witness share,
//!    opens the carrier share, reconstructs the voucher key, and signs the
//!    acknowledgement.
//!
//! Nothing reports back that the donor actually scanned the acknowledgement,
//! so after a grace period the device moves to `TimedSuccess` on its own.
//!
//! Re-scanning an offer that already produced an acknowledgement returns the
//! same acknowledgement bytes. The key is not reconstructed again and no
//! second signature is made. An answered offer is remembered until
//! [`PROCESSED_RETENTION_SECS`] after it expired; past that the donor can no
//! longer be showing it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::crypto::encryption::open_share;
use crate::crypto::hash::share_transport_key;
use crate::qr::{self, AckPayload, AckStatus, OfferPayload, ProtocolVersion};
use crate::sharing::{with_ephemeral_key, SecretShare, ShareRole};

use super::challenge::unix_seconds;
use super::error::TransferError;

/// How long past its expiry an answered offer is remembered.
pub const PROCESSED_RETENTION_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientState {
    Idle,
    ScanningOffer,
    ProcessingOffer,
    AckReady,
    TimedSuccess,
}

impl RecipientState {
    pub fn name(self) -> &'static str {
        match self {
            RecipientState::Idle => "Idle",
            RecipientState::ScanningOffer => "ScanningOffer",
            RecipientState::ProcessingOffer => "ProcessingOffer",
            RecipientState::AckReady => "AckReady",
            RecipientState::TimedSuccess => "TimedSuccess",
        }
    }
}

/// An offer that passed the public checks and is waiting for a witness share.
#[derive(Debug, Clone)]
pub struct VerifiedOffer {
    pub offer: OfferPayload,
    fingerprint: [u8; 32],
}

/// Result of the first processing phase.
#[derive(Debug, Clone)]
pub enum ScanStep {
    /// This exact offer was already processed. Show this ack again.
    AlreadyProcessed { ack: Vec<u8> },
    /// New offer; fetch the witness share and call `complete`.
    NeedsWitness(VerifiedOffer),
}

/// Everything a completed exchange hands to the device for persisting.
#[derive(Debug)]
pub struct ReceivedVoucher {
    pub offer: OfferPayload,
    /// The decrypted share that now makes this device the holder.
    pub carrier: SecretShare,
    pub ack: AckPayload,
    pub ack_bytes: Vec<u8>,
    /// Fingerprint of the offer this answers.
    pub fingerprint: [u8; 32],
}

/// An acknowledgement already produced, kept for rescans.
struct Answered {
    ack: Vec<u8>,
    offer_expires_at: u64,
}

pub struct RecipientSession {
    id: Uuid,
    version: ProtocolVersion,
    state: RecipientState,
    /// Offer fingerprint → acknowledgement already produced for it.
    processed: HashMap<[u8; 32], Answered>,
    reconstructions: u64,
}

impl RecipientSession {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            id: Uuid::new_v4(),
            version,
            state: RecipientState::Idle,
            processed: HashMap::new(),
            reconstructions: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RecipientState {
        self.state
    }

    /// Number of times a voucher key was rebuilt in this session.
    pub fn reconstructions(&self) -> u64 {
        self.reconstructions
    }

    /// Camera is open.
    pub fn start_scanning(&mut self) -> Result<(), TransferError> {
        if self.state == RecipientState::ProcessingOffer {
            return Err(TransferError::InvalidState {
                current: self.state.name(),
                attempted: "start scanning",
            });
        }
        self.state = RecipientState::ScanningOffer;
        Ok(())
    }

    /// Phase one: decode and check the offer.
    pub fn begin(&mut self, raw: &[u8], now: DateTime<Utc>) -> Result<ScanStep, TransferError> {
        if self.state == RecipientState::ProcessingOffer {
            return Err(TransferError::InvalidState {
                current: self.state.name(),
                attempted: "process a second offer",
            });
        }

        self.prune(unix_seconds(now));
        let bytes = qr::from_scanned(raw);
        let fingerprint = qr::fingerprint(&bytes);
        if let Some(answered) = self.processed.get(&fingerprint) {
            return Ok(ScanStep::AlreadyProcessed {
                ack: answered.ack.clone(),
            });
        }

        self.state = RecipientState::ProcessingOffer;
        let checked = self.check_offer(&bytes, now);
        match checked {
            Ok(offer) => Ok(ScanStep::NeedsWitness(VerifiedOffer { offer, fingerprint })),
            Err(e) => {
                self.state = RecipientState::ScanningOffer;
                Err(e)
            }
        }
    }

    fn check_offer(&self, bytes: &[u8], now: DateTime<Utc>) -> Result<OfferPayload, TransferError> {
        let offer = OfferPayload::decode(bytes, self.version)?;
        if !offer.verify_signature() {
            return Err(TransferError::SignatureMismatch(
                "offer is not signed by the voucher key",
            ));
        }
        let now = unix_seconds(now);
        if offer.is_expired(now) {
            return Err(TransferError::OfferExpired {
                expired_at: offer.expires_at(),
                now,
            });
        }
        Ok(offer)
    }

    /// Phase two: open, reconstruct, sign.
    pub fn complete(
        &mut self,
        verified: VerifiedOffer,
        witness: &SecretShare,
    ) -> Result<ReceivedVoucher, TransferError> {
        if self.state != RecipientState::ProcessingOffer {
            return Err(TransferError::InvalidState {
                current: self.state.name(),
                attempted: "complete an offer",
            });
        }
        match self.answer(&verified.offer, witness) {
            Ok((carrier, ack)) => {
                let ack_bytes = ack.encode().to_vec();
                self.processed.insert(
                    verified.fingerprint,
                    Answered {
                        ack: ack_bytes.clone(),
                        offer_expires_at: verified.offer.expires_at(),
                    },
                );
                self.state = RecipientState::AckReady;
                Ok(ReceivedVoucher {
                    offer: verified.offer,
                    carrier,
                    ack,
                    ack_bytes,
                    fingerprint: verified.fingerprint,
                })
            }
            Err(e) => {
                self.state = RecipientState::ScanningOffer;
                Err(e)
            }
        }
    }

    fn answer(
        &mut self,
        offer: &OfferPayload,
        witness: &SecretShare,
    ) -> Result<(SecretShare, AckPayload), TransferError> {
        if witness.role() != ShareRole::Witness {
            return Err(TransferError::MissingWitnessShare);
        }

        let transport_key = share_transport_key(witness.as_bytes());
        let opened = open_share(&offer.encrypted_carrier, &transport_key)
            .map_err(|_| TransferError::TamperedOrWrongShare)?;
        let carrier = SecretShare::new(ShareRole::Carrier, *opened);

        let message = offer.version.ack_message(&offer.challenge);
        let signature = with_ephemeral_key(&carrier, witness, |key| {
            if !key.matches(&offer.bon_id) {
                return Err(TransferError::TamperedOrWrongShare);
            }
            Ok(key.sign(&message))
        })?;
        self.reconstructions += 1;

        let ack = AckPayload {
            bon_id: offer.bon_id,
            status: AckStatus::Accepted,
            signature,
        };
        Ok((carrier, ack))
    }

    /// Forget answers to offers that expired more than the retention window ago.
    fn prune(&mut self, now: u64) {
        self.processed.retain(|_, answered| {
            answered.offer_expires_at.saturating_add(PROCESSED_RETENTION_SECS) >= now
        });
    }

    /// Phase one passed but phase two could not start (no witness share).
    pub fn abandon(&mut self) {
        if self.state == RecipientState::ProcessingOffer {
            self.state = RecipientState::ScanningOffer;
        }
    }

    /// Drop a processed offer, e.g. because the received voucher could not be
    /// persisted. The next scan of that offer is processed from scratch.
    pub fn forget(&mut self, fingerprint: &[u8; 32]) {
        self.processed.remove(fingerprint);
        if self.state == RecipientState::AckReady {
            self.state = RecipientState::ScanningOffer;
        }
    }

    /// Grace period elapsed after showing the acknowledgement.
    pub fn mark_success(&mut self) -> Result<(), TransferError> {
        if self.state != RecipientState::AckReady {
            return Err(TransferError::InvalidState {
                current: self.state.name(),
                attempted: "report success",
            });
        }
        self.state = RecipientState::TimedSuccess;
        Ok(())
    }
}
