//! In-process relay.
//!
//! Several devices can share one `Arc<MemoryRelay>` to simulate a market.
//! It can be switched offline, or slowed down, to exercise the outbox and
//! publish-timeout paths.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::crypto::encryption::EncryptedShare;
use crate::crypto::keys::BonId;

use super::{WitnessEvent, WitnessEventKind, WitnessNetwork};

pub struct MemoryRelay {
    events: RwLock<Vec<WitnessEvent>>,
    endpoint: RwLock<Option<String>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRelay {
    /// A relay that is reachable and accepts events immediately.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            endpoint: RwLock::new(None),
            offline: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// While offline, `publish` and `fetch` fail.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay applied to every publish.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Everything accepted so far, in arrival order.
    pub fn events(&self) -> Vec<WitnessEvent> {
        self.events.read().clone()
    }

    pub fn events_of_kind(&self, kind: WitnessEventKind) -> Vec<WitnessEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.endpoint.read().clone()
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WitnessNetwork for MemoryRelay {
    async fn connect(&self, endpoint: &str) -> bool {
        if self.is_offline() {
            return false;
        }
        *self.endpoint.write() = Some(endpoint.to_string());
        info!(endpoint, "connected to relay");
        true
    }

    async fn publish(&self, event: &WitnessEvent) -> bool {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.is_offline() {
            debug!(event_id = %event.id, "relay offline, publish refused");
            return false;
        }
        if !event.verify() {
            warn!(event_id = %event.id, "rejected event with bad id or signature");
            return false;
        }

        let mut events = self.events.write();
        // Relays are idempotent on event id.
        if !events.iter().any(|e| e.id == event.id) {
            events.push(event.clone());
        }
        true
    }

    async fn fetch(&self, bon_id: &BonId) -> Option<EncryptedShare> {
        if self.is_offline() {
            return None;
        }
        // The issuer publishes at mint time, so the earliest distribution
        // wins over anything posted for the same bonId later.
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == WitnessEventKind::ShareDistribution && e.bon_id == *bon_id)
            .filter_map(|e| e.sealed_share().map(|sealed| (e.created_at, sealed)))
            .min_by_key(|(created_at, _)| *created_at)
            .map(|(_, sealed)| sealed)
    }

    async fn disconnect(&self) {
        *self.endpoint.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encryption::seal_share;
    use crate::crypto::keys::BonKeypair;
    use chrono::Utc;

    fn share_event(bon: BonId) -> WitnessEvent {
        let sealed = seal_share(&[1; 32], &[2; 32]).unwrap();
        WitnessEvent::share_distribution(&BonKeypair::generate(), "m", bon, &sealed, Utc::now())
    }

    #[tokio::test]
    async fn publish_is_idempotent() {
        let relay = MemoryRelay::new();
        let ev = share_event(BonKeypair::generate().public_key());
        assert!(relay.publish(&ev).await);
        assert!(relay.publish(&ev).await);
        assert_eq!(relay.events().len(), 1);
    }

    #[tokio::test]
    async fn offline_relay_refuses_everything() {
        let relay = MemoryRelay::new();
        let bon = BonKeypair::generate().public_key();
        relay.set_offline(true);
        assert!(!relay.connect("mem://").await);
        assert!(!relay.publish(&share_event(bon)).await);
        assert!(relay.fetch(&bon).await.is_none());

        relay.set_offline(false);
        assert!(relay.connect("mem://").await);
        assert_eq!(relay.endpoint().as_deref(), Some("mem://"));
        relay.disconnect().await;
        assert!(relay.endpoint().is_none());
    }

    #[tokio::test]
    async fn tampered_events_are_rejected() {
        let relay = MemoryRelay::new();
        let mut ev = share_event(BonKeypair::generate().public_key());
        ev.market = "other".into();
        assert!(!relay.publish(&ev).await);
        assert!(relay.events().is_empty());
    }

    #[tokio::test]
    async fn earliest_distribution_wins() {
        let relay = MemoryRelay::new();
        let bon = BonKeypair::generate().public_key();
        let t0 = Utc::now();
        let original = seal_share(&[1; 32], &[2; 32]).unwrap();
        let junk = seal_share(&[9; 32], &[2; 32]).unwrap();

        let first = WitnessEvent::share_distribution(&BonKeypair::generate(), "m", bon, &original, t0);
        let later = WitnessEvent::share_distribution(
            &BonKeypair::generate(),
            "m",
            bon,
            &junk,
            t0 + chrono::Duration::seconds(5),
        );
        assert!(relay.publish(&first).await);
        assert!(relay.publish(&later).await);
        assert_eq!(relay.fetch(&bon).await, Some(original));
    }
}
