//! # Device Adapter
//!
//! Glues the pure donor/recipient sessions to a [`VoucherStore`] and a
//! [`WitnessNetwork`]. This is the surface a UI talks to: it hands in raw
//! scanned bytes and gets back bytes to render, plus outcomes to display.
//!
//! ## Concurrency
//!
//! One exchange at a time. Scans arrive from the camera callback and may
//! overlap; a scan that arrives while another is being processed is
//! dropped with [`ScanOutcome::Ignored`], never queued. Session state sits
//! behind `parking_lot` mutexes that are never held across an await.
//!
//! ## Commit before publish
//!
//! On a verified acknowledgement the donor deletes its carrier share and
//! marks the voucher spent *first*. Only then does it try to publish the
//! transfer record, under a timeout. A failed publish leaves the commit in
//! place and parks the record in the outbox; [`Device::flush_outbox`]
//! retries later without redoing any cryptography.
//!
//! Once the carrier share is gone `scan_ack` always reports the commit. A
//! store that fails to queue the record or append to the audit trail is
//! logged, not returned: the caller must never be told to retry a transfer
//! that already happened. Offer creation and cancellation take the same
//! scan lock, so neither can interleave with a commit.
//!
//! ## Witness share cache
//!
//! A fetched witness share is cached only after it rebuilt the voucher key.
//! A cached share that fails to match is evicted, so the next attempt goes
//! back to the network.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::crypto::keys::{BonId, BonKeypair, BonPublicKey};
use crate::qr;
use crate::sharing::{SecretShare, ShareRole};
use crate::storage::{AuditEntry, AuditKind, OutboxEntry, VoucherStore};
use crate::voucher::{issue_voucher, Amount, IssueRequest, Market, Voucher, VoucherStatus};
use crate::witness::{fetch_witness_share, WitnessEvent, WitnessNetwork};

use super::challenge::Challenge;
use super::donor::{DonorSession, DonorState};
use super::error::TransferError;
use super::recipient::{RecipientSession, RecipientState, ScanStep};
use super::record::TransferRecord;

/// What happened to a scan.
#[derive(Debug)]
pub enum ScanOutcome<T> {
    Processed(T),
    /// Another scan was already being processed.
    Ignored,
}

impl<T> ScanOutcome<T> {
    pub fn processed(self) -> Option<T> {
        match self {
            ScanOutcome::Processed(t) => Some(t),
            ScanOutcome::Ignored => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Published,
    /// Queued in the outbox.
    PendingPublish,
}

#[derive(Debug)]
pub struct IssueOutcome {
    pub voucher: Voucher,
    pub publish: PublishStatus,
}

/// A committed transfer, from the donor's side.
#[derive(Debug)]
pub struct CommitOutcome {
    pub record: TransferRecord,
    pub publish: PublishStatus,
}

/// A processed offer, from the recipient's side.
#[derive(Debug)]
pub enum ReceiveOutcome {
    Accepted { voucher: Voucher, ack: Vec<u8> },
    /// Rescan of an offer already answered. Same bytes as the first time.
    AlreadyProcessed { ack: Vec<u8> },
}

impl ReceiveOutcome {
    /// The acknowledgement to render.
    pub fn ack(&self) -> &[u8] {
        match self {
            ReceiveOutcome::Accepted { ack, .. } | ReceiveOutcome::AlreadyProcessed { ack } => ack,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub published: usize,
    pub remaining: usize,
}

/// One phone.
pub struct Device {
    identity: BonKeypair,
    market: Market,
    config: TransferConfig,
    store: Arc<dyn VoucherStore>,
    network: Arc<dyn WitnessNetwork>,
    scan_lock: tokio::sync::Mutex<()>,
    donor: Mutex<Option<DonorSession>>,
    recipient: Mutex<RecipientSession>,
}

impl Device {
    pub fn new(
        identity: BonKeypair,
        market: Market,
        config: TransferConfig,
        store: Arc<dyn VoucherStore>,
        network: Arc<dyn WitnessNetwork>,
    ) -> Self {
        let recipient = RecipientSession::new(config.protocol_version);
        Self {
            identity,
            market,
            config,
            store,
            network,
            scan_lock: tokio::sync::Mutex::new(()),
            donor: Mutex::new(None),
            recipient: Mutex::new(recipient),
        }
    }

    /// Build a device from a store that already holds the market key.
    pub async fn open(
        identity: BonKeypair,
        market_name: &str,
        relay: &str,
        config: TransferConfig,
        store: Arc<dyn VoucherStore>,
        network: Arc<dyn WitnessNetwork>,
    ) -> Result<Self, TransferError> {
        let key = store
            .market_key()
            .await?
            .ok_or(TransferError::MissingMarketKey)?;
        let market = Market::new(market_name, relay, key);
        Ok(Self::new(identity, market, config, store, network))
    }

    pub fn identity(&self) -> BonPublicKey {
        self.identity.public_key()
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VoucherStore> {
        &self.store
    }

    pub fn donor_state(&self) -> Option<DonorState> {
        self.donor.lock().as_ref().map(DonorSession::state)
    }

    pub fn recipient_state(&self) -> RecipientState {
        self.recipient.lock().state()
    }

    /// How many times this device rebuilt a voucher key while receiving.
    pub fn reconstructions(&self) -> u64 {
        self.recipient.lock().reconstructions()
    }

    pub async fn connect(&self) -> bool {
        self.network.connect(&self.market.relay).await
    }

    pub async fn disconnect(&self) {
        self.network.disconnect().await
    }

    // -----------------------------------------------------------------------
    // Issuance
    // -----------------------------------------------------------------------

    /// Mint a voucher, keep its shares, and publish the sealed witness share.
    pub async fn issue(
        &self,
        value: Amount,
        issuer_name: &str,
        category: &str,
    ) -> Result<IssueOutcome, TransferError> {
        let now = Utc::now();
        let request = IssueRequest {
            value,
            issuer_name: issuer_name.to_string(),
            category: category.to_string(),
            lifetime_days: self.config.issued_voucher_lifetime_days,
        };
        let issued = issue_voucher(&self.identity.public_key(), &self.market, request, now)?;
        let bon_id = issued.voucher.bon_id;
        let carrier = issued
            .voucher
            .carrier_share
            .clone()
            .ok_or(TransferError::MissingShare("carrier"))?;

        self.store.save_share(&bon_id, issued.anchor.clone()).await?;
        self.store.save_share(&bon_id, issued.witness.clone()).await?;
        self.store.save_share(&bon_id, carrier).await?;
        self.store.save_voucher(&issued.voucher).await?;
        self.audit(AuditEntry::new(
            AuditKind::Issue,
            bon_id,
            format!("issued {} as {}", issued.voucher.value, issuer_name),
            now,
        ))
        .await;
        info!(bon_id = %bon_id.short(), value = %issued.voucher.value, "voucher issued");

        let event = WitnessEvent::share_distribution(
            &self.identity,
            &self.market.name,
            bon_id,
            &issued.sealed_witness,
            now,
        );
        let publish = if self.publish_now(&event).await {
            self.audit(AuditEntry::new(AuditKind::Publish, bon_id, "witness share", now))
                .await;
            PublishStatus::Published
        } else {
            self.queue(event).await?;
            PublishStatus::PendingPublish
        };

        Ok(IssueOutcome {
            voucher: issued.voucher,
            publish,
        })
    }

    // -----------------------------------------------------------------------
    // Donor side
    // -----------------------------------------------------------------------

    /// Show an offer for `bon_id`. Calling it again regenerates the offer
    /// with a new challenge, which is what the UI does on expiry.
    pub async fn create_offer(&self, bon_id: &BonId) -> Result<Vec<u8>, TransferError> {
        let _guard = self.scan_lock.lock().await;
        let now = Utc::now();
        if !self.market.is_active(now) {
            return Err(TransferError::MarketExpired(self.market.name.clone()));
        }
        let mut voucher = self
            .store
            .voucher(bon_id)
            .await?
            .ok_or_else(|| TransferError::VoucherNotFound(bon_id.short()))?;
        let carrier = self
            .store
            .share(bon_id, ShareRole::Carrier)
            .await?
            .ok_or(TransferError::MissingShare("carrier"))?;
        let witness = self
            .store
            .share(bon_id, ShareRole::Witness)
            .await?
            .ok_or(TransferError::MissingShare("witness"))?;

        let generated = {
            let mut slot = self.donor.lock();
            let reusable = slot.as_ref().is_some_and(|s| {
                s.voucher().bon_id == *bon_id && s.state() != DonorState::Committed
            });
            if !reusable {
                *slot = None;
            }
            let session = slot.get_or_insert_with(|| DonorSession::new(voucher.clone(), &self.config));
            session.generate_offer(&carrier, &witness, now).and_then(|bytes| {
                session.await_ack()?;
                Ok((bytes, session.id()))
            })
        };
        let (bytes, session_id) = match generated {
            Ok(generated) => generated,
            Err(TransferError::TamperedOrWrongShare) => {
                self.evict_witness(bon_id).await;
                return Err(TransferError::TamperedOrWrongShare);
            }
            Err(e) => return Err(e),
        };

        if voucher.status == VoucherStatus::Active {
            voucher.status = VoucherStatus::PendingTransfer;
            self.store.save_voucher(&voucher).await?;
        }
        debug!(bon_id = %bon_id.short(), session_id = %session_id, len = bytes.len(), "offer ready");
        Ok(bytes)
    }

    /// The current offer's bytes, if it is still valid.
    pub fn current_offer(&self) -> Option<Vec<u8>> {
        let now = Utc::now();
        let slot = self.donor.lock();
        let session = slot.as_ref()?;
        if session.state() == DonorState::Committed || session.offer_expired(now) {
            return None;
        }
        session.offer_bytes().map(<[u8]>::to_vec)
    }

    /// Take the offer off screen. The voucher goes back to `Active`.
    ///
    /// Waits for a scan in progress. An offer whose acknowledgement was
    /// already committed cannot be cancelled.
    pub async fn cancel_offer(&self) -> Result<(), TransferError> {
        let _guard = self.scan_lock.lock().await;
        let session = {
            let mut slot = self.donor.lock();
            match slot.as_ref().map(DonorSession::state) {
                None => return Ok(()),
                Some(DonorState::Committed) => {
                    return Err(TransferError::InvalidState {
                        current: DonorState::Committed.name(),
                        attempted: "cancel the offer",
                    })
                }
                Some(_) => slot.take(),
            }
        };
        let Some(session) = session else {
            return Ok(());
        };
        let bon_id = session.voucher().bon_id;
        if let Some(mut voucher) = self.store.voucher(&bon_id).await? {
            if voucher.status == VoucherStatus::PendingTransfer {
                voucher.status = VoucherStatus::Active;
                self.store.save_voucher(&voucher).await?;
            }
        }
        debug!(bon_id = %bon_id.short(), "offer cancelled");
        Ok(())
    }

    /// Handle a scanned acknowledgement: verify, commit, publish.
    pub async fn scan_ack(&self, raw: &[u8]) -> Result<ScanOutcome<CommitOutcome>, TransferError> {
        let Ok(_guard) = self.scan_lock.try_lock() else {
            debug!("acknowledgement scan ignored, another scan in progress");
            return Ok(ScanOutcome::Ignored);
        };

        let bytes = qr::from_scanned(raw);
        let (accepted, session_id) = {
            let mut slot = self.donor.lock();
            let session = slot.as_mut().ok_or(TransferError::InvalidState {
                current: DonorState::Idle.name(),
                attempted: "verify an acknowledgement",
            })?;
            let accepted = session.verify_ack(&bytes).map_err(|e| {
                warn!(session_id = %session.id(), error = %e, "acknowledgement rejected");
                e
            })?;
            (accepted, session.id())
        };
        let bon_id = accepted.ack.bon_id;

        let now = Utc::now();
        let commit = match self.persist_commit(&bon_id, &accepted.challenge, now).await {
            Ok(commit) => commit,
            Err(e) => {
                if let Some(session) = self.donor.lock().as_mut() {
                    session.abort_commit();
                }
                return Err(e);
            }
        };

        // The carrier share is gone. Nothing below may return an error.
        if let Some(session) = self.donor.lock().as_mut() {
            if let Err(e) = session.commit() {
                warn!(session_id = %session_id, error = %e, "donor session out of step with the commit");
            }
        }
        info!(bon_id = %bon_id.short(), session_id = %session_id, "transfer committed");

        let (record, publish) = if self.publish_now(&commit.online).await {
            (commit.record, PublishStatus::Published)
        } else {
            let entry = OutboxEntry::new(commit.offline, now);
            if let Err(e) = self.store.enqueue_publish(entry).await {
                error!(bon_id = %bon_id.short(), error = %e, "transfer record could not be queued");
            }
            (commit.record.offline(), PublishStatus::PendingPublish)
        };

        self.audit(
            AuditEntry::new(AuditKind::Send, bon_id, format!("sent {}", commit.value), now)
                .in_session(session_id),
        )
        .await;
        let (kind, message) = match publish {
            PublishStatus::Published => (AuditKind::Publish, "transfer record"),
            PublishStatus::PendingPublish => (AuditKind::PublishQueued, "queued for retry"),
        };
        self.audit(AuditEntry::new(kind, bon_id, message, now).in_session(session_id))
            .await;

        Ok(ScanOutcome::Processed(CommitOutcome { record, publish }))
    }

    /// Build the transfer record, then delete the carrier share and mark the
    /// voucher spent. Everything that can fail short of the store happens
    /// before the delete.
    async fn persist_commit(
        &self,
        bon_id: &BonId,
        challenge: &Challenge,
        now: DateTime<Utc>,
    ) -> Result<PreparedCommit, TransferError> {
        let mut voucher = self
            .store
            .voucher(bon_id)
            .await?
            .ok_or_else(|| TransferError::VoucherNotFound(bon_id.short()))?;
        let record =
            TransferRecord::for_qr_transfer(&voucher, self.identity.public_key(), challenge, now);
        let online = WitnessEvent::transfer_record(&self.identity, &record, now)?;
        let offline = WitnessEvent::transfer_record(&self.identity, &record.clone().offline(), now)?;

        self.store.delete_share(bon_id, ShareRole::Carrier).await?;
        voucher.mark_spent();
        self.store.save_voucher(&voucher).await?;
        Ok(PreparedCommit {
            value: voucher.value,
            record,
            online,
            offline,
        })
    }

    // -----------------------------------------------------------------------
    // Recipient side
    // -----------------------------------------------------------------------

    /// Handle a scanned offer and produce the acknowledgement to show.
    pub async fn receive_offer(
        &self,
        raw: &[u8],
    ) -> Result<ScanOutcome<ReceiveOutcome>, TransferError> {
        let Ok(_guard) = self.scan_lock.try_lock() else {
            debug!("offer scan ignored, another scan in progress");
            return Ok(ScanOutcome::Ignored);
        };

        let now = Utc::now();
        if !self.market.is_active(now) {
            return Err(TransferError::MarketExpired(self.market.name.clone()));
        }

        let step = self.recipient.lock().begin(raw, now)?;
        let verified = match step {
            ScanStep::AlreadyProcessed { ack } => {
                debug!("offer already processed, showing the same acknowledgement");
                return Ok(ScanOutcome::Processed(ReceiveOutcome::AlreadyProcessed { ack }));
            }
            ScanStep::NeedsWitness(verified) => verified,
        };
        let bon_id = verified.offer.bon_id;

        let lookup = match self.lookup_witness(&bon_id).await {
            Ok(lookup) => lookup,
            Err(e) => {
                self.recipient.lock().abandon();
                return Err(e);
            }
        };

        let completed = {
            let mut session = self.recipient.lock();
            session
                .complete(verified, &lookup.share)
                .map(|received| (received, session.id()))
        };
        let (received, session_id) = match completed {
            Ok(completed) => completed,
            Err(TransferError::TamperedOrWrongShare) => {
                if lookup.cached {
                    self.evict_witness(&bon_id).await;
                }
                return Err(TransferError::TamperedOrWrongShare);
            }
            Err(e) => return Err(e),
        };

        let offer = &received.offer;
        let voucher = Voucher::received(
            bon_id,
            offer.value,
            offer.issuer,
            offer.issuer_name.clone(),
            self.market.name.clone(),
            received.carrier.clone(),
            now,
        );
        let fetched = (!lookup.cached).then_some(&lookup.share);
        if let Err(e) = self
            .persist_received(&voucher, &received.carrier, fetched, session_id)
            .await
        {
            self.recipient.lock().forget(&received.fingerprint);
            return Err(e);
        }
        info!(bon_id = %bon_id.short(), session_id = %session_id, value = %voucher.value, "voucher received");

        Ok(ScanOutcome::Processed(ReceiveOutcome::Accepted {
            voucher,
            ack: received.ack_bytes,
        }))
    }

    async fn persist_received(
        &self,
        voucher: &Voucher,
        carrier: &SecretShare,
        fetched_witness: Option<&SecretShare>,
        session_id: Uuid,
    ) -> Result<(), TransferError> {
        if let Some(witness) = fetched_witness {
            self.store.save_share(&voucher.bon_id, witness.clone()).await?;
        }
        self.store.save_share(&voucher.bon_id, carrier.clone()).await?;
        self.store.save_voucher(voucher).await?;
        self.audit(
            AuditEntry::new(
                AuditKind::Receive,
                voucher.bon_id,
                format!("received {} from {}", voucher.value, voucher.issuer_name),
                voucher.created_at,
            )
            .in_session(session_id),
        )
        .await;
        Ok(())
    }

    /// Wait out the grace period, then report success.
    pub async fn await_success(&self) -> Result<(), TransferError> {
        tokio::time::sleep(self.config.success_grace()).await;
        self.recipient.lock().mark_success()
    }

    /// Cached witness share, else fetched from the network and cached.
    ///
    /// This is the resync path: it trusts the network's earliest
    /// distribution for `bon_id`. A share that later fails to rebuild the
    /// key is evicted by the exchange that notices.
    pub async fn witness_share(&self, bon_id: &BonId) -> Result<SecretShare, TransferError> {
        let lookup = self.lookup_witness(bon_id).await?;
        if !lookup.cached {
            self.store.save_share(bon_id, lookup.share.clone()).await?;
        }
        Ok(lookup.share)
    }

    async fn lookup_witness(&self, bon_id: &BonId) -> Result<WitnessLookup, TransferError> {
        if let Some(share) = self.store.share(bon_id, ShareRole::Witness).await? {
            return Ok(WitnessLookup { share, cached: true });
        }
        let share = fetch_witness_share(self.network.as_ref(), bon_id, &self.market.key).await?;
        Ok(WitnessLookup { share, cached: false })
    }

    /// Drop a cached witness share that did not rebuild the voucher key.
    async fn evict_witness(&self, bon_id: &BonId) {
        match self.store.delete_share(bon_id, ShareRole::Witness).await {
            Ok(()) => warn!(bon_id = %bon_id.short(), "cached witness share did not match, evicted"),
            Err(e) => warn!(bon_id = %bon_id.short(), error = %e, "could not evict witness share"),
        }
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Retry everything in the outbox once.
    pub async fn flush_outbox(&self) -> Result<FlushReport, TransferError> {
        let mut report = FlushReport::default();
        for entry in self.store.pending_publishes().await? {
            if self.publish_now(&entry.event).await {
                self.store.remove_publish(entry.id).await?;
                self.audit(AuditEntry::new(
                    AuditKind::Publish,
                    entry.event.bon_id,
                    format!("{:?} from outbox", entry.event.kind),
                    Utc::now(),
                ))
                .await;
                report.published += 1;
            } else {
                report.remaining += 1;
            }
        }
        if report.published > 0 || report.remaining > 0 {
            info!(published = report.published, remaining = report.remaining, "outbox flushed");
        }
        Ok(report)
    }

    async fn publish_now(&self, event: &WitnessEvent) -> bool {
        let timeout = self.config.publish_timeout();
        match tokio::time::timeout(timeout, self.network.publish(event)).await {
            Ok(true) => {
                debug!(event_id = %event.id, "event published");
                true
            }
            Ok(false) => {
                warn!(event_id = %event.id, "relay refused event");
                false
            }
            Err(_) => {
                warn!(event_id = %event.id, timeout_ms = timeout.as_millis() as u64, "publish timed out");
                false
            }
        }
    }

    async fn queue(&self, event: WitnessEvent) -> Result<(), TransferError> {
        let bon_id = event.bon_id;
        let now = Utc::now();
        self.store.enqueue_publish(OutboxEntry::new(event, now)).await?;
        self.audit(AuditEntry::new(AuditKind::PublishQueued, bon_id, "queued for retry", now))
            .await;
        Ok(())
    }

    /// The audit trail is local history. Losing a line is logged, never
    /// returned.
    async fn audit(&self, entry: AuditEntry) {
        let kind = entry.kind;
        if let Err(e) = self.store.append_audit(entry).await {
            warn!(kind = kind.label(), error = %e, "audit entry dropped");
        }
    }
}

/// A witness share and whether it came from the local cache.
struct WitnessLookup {
    share: SecretShare,
    cached: bool,
}

/// Everything `scan_ack` needs once the carrier share is deleted.
struct PreparedCommit {
    value: Amount,
    record: TransferRecord,
    online: WitnessEvent,
    offline: WitnessEvent,
}
