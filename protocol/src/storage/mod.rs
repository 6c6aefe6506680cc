//! # Storage
//!
//! Device-local persistence, behind one async trait.
//!
//! ```text
//! mod.rs     — VoucherStore trait, StoreError, OutboxEntry, AuditEntry
//! memory.rs  — MemoryStore, the in-process reference implementation
//! ```
//!
//! A real app backs [`VoucherStore`] with an encrypted key-value store; the
//! protocol only needs the operations below. Absence is never an error:
//! lookups return `Ok(None)` and the caller decides what a missing share or
//! voucher means.
//!
//! ## What lives here
//!
//! - **Shares**, keyed by `(bonId, role)`. The carrier share makes this
//!   device the holder; the witness share is a cache of what the network
//!   holds; the anchor share is only ever present on the issuer.
//! - **Vouchers**, keyed by `bonId`.
//! - **The market key**, if this device has joined a market.
//! - **The outbox**: witness events that could not be published yet.
//! - **The audit log**: an append-only local history of what this device did.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::keys::BonId;
use crate::sharing::{SecretShare, ShareRole};
use crate::voucher::{MarketKey, Voucher};
use crate::witness::WitnessEvent;

pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A witness event waiting for the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub event: WitnessEvent,
    pub queued_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(event: WitnessEvent, queued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            queued_at,
        }
    }
}

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Issue,
    Send,
    Receive,
    Publish,
    PublishQueued,
}

impl AuditKind {
    pub fn label(self) -> &'static str {
        match self {
            AuditKind::Issue => "ISSUE",
            AuditKind::Send => "SEND",
            AuditKind::Receive => "RECEIVE",
            AuditKind::Publish => "PUBLISH",
            AuditKind::PublishQueued => "PUBLISH_QUEUED",
        }
    }
}

/// One line of the local audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub bon_id: BonId,
    /// Session that produced the entry, if any.
    pub session_id: Option<Uuid>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, bon_id: BonId, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            bon_id,
            session_id: None,
            message: message.into(),
            at,
        }
    }

    pub fn in_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

// ---------------------------------------------------------------------------
// Store Trait
// ---------------------------------------------------------------------------

/// Everything the protocol persists on a device.
#[async_trait]
pub trait VoucherStore: Send + Sync {
    async fn share(&self, bon_id: &BonId, role: ShareRole) -> StoreResult<Option<SecretShare>>;

    /// Insert or replace the share with the same role.
    async fn save_share(&self, bon_id: &BonId, share: SecretShare) -> StoreResult<()>;

    /// Remove a share. Deleting a share that is not there is not an error.
    async fn delete_share(&self, bon_id: &BonId, role: ShareRole) -> StoreResult<()>;

    async fn voucher(&self, bon_id: &BonId) -> StoreResult<Option<Voucher>>;

    /// Insert or replace by `bonId`.
    async fn save_voucher(&self, voucher: &Voucher) -> StoreResult<()>;

    async fn vouchers(&self) -> StoreResult<Vec<Voucher>>;

    async fn market_key(&self) -> StoreResult<Option<MarketKey>>;

    async fn enqueue_publish(&self, entry: OutboxEntry) -> StoreResult<()>;

    /// Queued events, oldest first.
    async fn pending_publishes(&self) -> StoreResult<Vec<OutboxEntry>>;

    async fn remove_publish(&self, id: Uuid) -> StoreResult<()>;

    async fn append_audit(&self, entry: AuditEntry) -> StoreResult<()>;

    /// The whole trail, oldest first.
    async fn audit_log(&self) -> StoreResult<Vec<AuditEntry>>;
}
