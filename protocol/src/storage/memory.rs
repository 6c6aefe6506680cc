//! In-process [`VoucherStore`].
//!
//! Shares and vouchers sit in `DashMap`s; the outbox and audit log need
//! ordering, so they are `Vec`s behind `parking_lot` locks. No lock is held
//! across an await point.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::crypto::keys::BonId;
use crate::sharing::{SecretShare, ShareRole};
use crate::voucher::{MarketKey, Voucher};

use super::{AuditEntry, OutboxEntry, StoreResult, VoucherStore};

#[derive(Default)]
pub struct MemoryStore {
    shares: DashMap<(BonId, ShareRole), SecretShare>,
    vouchers: DashMap<BonId, Voucher>,
    market_key: RwLock<Option<MarketKey>>,
    outbox: Mutex<Vec<OutboxEntry>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store for a device that has already joined a market.
    pub fn with_market_key(key: MarketKey) -> Self {
        let store = Self::default();
        *store.market_key.write() = Some(key);
        store
    }

    pub fn set_market_key(&self, key: MarketKey) {
        *self.market_key.write() = Some(key);
    }
}

#[async_trait]
impl VoucherStore for MemoryStore {
    async fn share(&self, bon_id: &BonId, role: ShareRole) -> StoreResult<Option<SecretShare>> {
        Ok(self.shares.get(&(*bon_id, role)).map(|s| s.clone()))
    }

    async fn save_share(&self, bon_id: &BonId, share: SecretShare) -> StoreResult<()> {
        self.shares.insert((*bon_id, share.role()), share);
        Ok(())
    }

    async fn delete_share(&self, bon_id: &BonId, role: ShareRole) -> StoreResult<()> {
        // The removed share is dropped here, which zeroizes it.
        self.shares.remove(&(*bon_id, role));
        Ok(())
    }

    async fn voucher(&self, bon_id: &BonId) -> StoreResult<Option<Voucher>> {
        Ok(self.vouchers.get(bon_id).map(|v| v.clone()))
    }

    async fn save_voucher(&self, voucher: &Voucher) -> StoreResult<()> {
        self.vouchers.insert(voucher.bon_id, voucher.clone());
        Ok(())
    }

    async fn vouchers(&self) -> StoreResult<Vec<Voucher>> {
        let mut all: Vec<Voucher> = self.vouchers.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|v| v.created_at);
        Ok(all)
    }

    async fn market_key(&self) -> StoreResult<Option<MarketKey>> {
        Ok(self.market_key.read().clone())
    }

    async fn enqueue_publish(&self, entry: OutboxEntry) -> StoreResult<()> {
        self.outbox.lock().push(entry);
        Ok(())
    }

    async fn pending_publishes(&self) -> StoreResult<Vec<OutboxEntry>> {
        Ok(self.outbox.lock().clone())
    }

    async fn remove_publish(&self, id: Uuid) -> StoreResult<()> {
        self.outbox.lock().retain(|e| e.id != id);
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> StoreResult<()> {
        self.audit.lock().push(entry);
        Ok(())
    }

    async fn audit_log(&self) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.audit.lock().clone())
    }
}
