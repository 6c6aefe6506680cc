//! End-to-end tests for the Bon transfer protocol.
//!
//! Two or three `Device`s share one in-memory relay, the way phones in the
//! same market share relays in production. QR codes are just the byte
//! vectors one device returns and another is handed.
//!
//! Each test builds its own devices. No shared state between tests.

use std::sync::Arc;
use std::time::Duration;

use bon_protocol::config::TransferConfig;
use bon_protocol::crypto::keys::BonKeypair;
use bon_protocol::crypto::seal_share;
use bon_protocol::qr::{self, AckPayload, OfferPayload, ProtocolVersion};
use bon_protocol::sharing::{combine, ShareRole};
use bon_protocol::storage::{AuditKind, MemoryStore, VoucherStore};
use bon_protocol::transfer::{
    Device, DonorState, PublishStatus, ReceiveOutcome, RecipientState, TransferError,
    TransferStatus, UserAction,
};
use bon_protocol::voucher::{Amount, Market, MarketKey, VoucherStatus};
use bon_protocol::witness::{MemoryRelay, WitnessEvent, WitnessEventKind, WitnessNetwork};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const SEED: &[u8] = b"riverside market seed";

fn fast_config(version: ProtocolVersion) -> TransferConfig {
    TransferConfig {
        success_grace_ms: 20,
        publish_timeout_ms: 250,
        protocol_version: version,
        ..TransferConfig::default()
    }
}

fn device_with(relay: &Arc<MemoryRelay>, config: TransferConfig) -> (Device, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let device = Device::new(
        BonKeypair::generate(),
        Market::new("riverside", "mem://riverside", MarketKey::from_seed(SEED)),
        config,
        store.clone(),
        relay.clone(),
    );
    (device, store)
}

fn device(relay: &Arc<MemoryRelay>) -> (Device, Arc<MemoryStore>) {
    device_with(relay, fast_config(ProtocolVersion::V2))
}

fn accepted_ack(outcome: ReceiveOutcome) -> Vec<u8> {
    match outcome {
        ReceiveOutcome::Accepted { ack, .. } => ack,
        ReceiveOutcome::AlreadyProcessed { .. } => panic!("offer should have been new"),
    }
}

// ---------------------------------------------------------------------------
// Full Exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn issue_offer_accept_commit_publish() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, alice_store) = device(&relay);
    let (bob, bob_store) = device(&relay);
    assert!(alice.connect().await);

    let issued = alice
        .issue("12.50".parse().unwrap(), "Riverside Bakery", "food")
        .await
        .unwrap();
    assert_eq!(issued.publish, PublishStatus::Published);
    let bon_id = issued.voucher.bon_id;

    // Alice shows an offer.
    let offer_bytes = alice.create_offer(&bon_id).await.unwrap();
    assert_eq!(alice.donor_state(), Some(DonorState::AwaitingAck));
    let offer = OfferPayload::decode(&offer_bytes, ProtocolVersion::V2).unwrap();
    assert_eq!(offer.value, Amount::from_centimes(1250));
    assert_eq!(offer.issuer_name, "Riverside Bakery");

    // Bob scans it, fetching the witness share from the relay.
    let outcome = bob.receive_offer(&offer_bytes).await.unwrap().processed().unwrap();
    let ack = accepted_ack(outcome);
    assert_eq!(ack.len(), 97);
    assert_eq!(bob.recipient_state(), RecipientState::AckReady);

    // Alice scans Bob's acknowledgement.
    let commit = alice.scan_ack(&ack).await.unwrap().processed().unwrap();
    assert_eq!(commit.publish, PublishStatus::Published);
    assert_eq!(commit.record.status, TransferStatus::Completed);
    assert_eq!(commit.record.receiver, None);
    assert_eq!(commit.record.method, "qr");
    assert_eq!(alice.donor_state(), Some(DonorState::Committed));

    // Alice no longer holds the voucher.
    assert!(alice_store.share(&bon_id, ShareRole::Carrier).await.unwrap().is_none());
    let spent = alice_store.voucher(&bon_id).await.unwrap().unwrap();
    assert_eq!(spent.status, VoucherStatus::Spent);
    assert!(spent.carrier_share.is_none());

    // Bob does, with no expiry, and his shares rebuild the voucher key.
    let held = bob_store.voucher(&bon_id).await.unwrap().unwrap();
    assert_eq!(held.status, VoucherStatus::Active);
    assert!(held.expires_at.is_none());
    let carrier = bob_store.share(&bon_id, ShareRole::Carrier).await.unwrap().unwrap();
    let witness = bob_store.share(&bon_id, ShareRole::Witness).await.unwrap().unwrap();
    let seed = combine(&carrier, &witness).unwrap();
    assert_eq!(BonKeypair::from_seed(&seed).public_key(), bon_id);

    // The relay saw the share distribution and the transfer record.
    let records = relay.events_of_kind(WitnessEventKind::TransferRecord);
    assert_eq!(records.len(), 1);
    assert!(records[0].verify());
    assert_eq!(records[0].transfer().unwrap(), commit.record);

    bob.await_success().await.unwrap();
    assert_eq!(bob.recipient_state(), RecipientState::TimedSuccess);

    let kinds: Vec<_> = bob_store.audit_log().await.unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![AuditKind::Receive]);
}

#[tokio::test]
async fn received_voucher_can_be_passed_on() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device(&relay);
    let (bob, _) = device(&relay);
    let (carol, carol_store) = device(&relay);

    let bon_id = alice
        .issue(Amount::from_centimes(500), "Alice", "")
        .await
        .unwrap()
        .voucher
        .bon_id;

    let offer = alice.create_offer(&bon_id).await.unwrap();
    let ack = accepted_ack(bob.receive_offer(&offer).await.unwrap().processed().unwrap());
    alice.scan_ack(&ack).await.unwrap();

    // Bob already cached the witness share, so this needs no relay at all.
    relay.set_offline(true);
    let offer = bob.create_offer(&bon_id).await.unwrap();
    relay.set_offline(false);
    let ack = accepted_ack(carol.receive_offer(&offer).await.unwrap().processed().unwrap());
    let commit = bob.scan_ack(&ack).await.unwrap().processed().unwrap();
    assert_eq!(commit.record.sender, bob.identity());

    let v = carol_store.voucher(&bon_id).await.unwrap().unwrap();
    assert_eq!(v.status, VoucherStatus::Active);
    assert_eq!(v.issuer_name, "Alice");
}

#[tokio::test]
async fn legacy_v1_exchange() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device_with(&relay, fast_config(ProtocolVersion::V1));
    let (bob, bob_store) = device_with(&relay, fast_config(ProtocolVersion::V1));

    let bon_id = alice
        .issue(Amount::from_centimes(200), "Ignored In V1", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer = alice.create_offer(&bon_id).await.unwrap();
    assert_eq!(offer.len(), 213);

    let ack = accepted_ack(bob.receive_offer(&offer).await.unwrap().processed().unwrap());
    let decoded = AckPayload::decode(&ack, ProtocolVersion::V1).unwrap();
    let challenge = OfferPayload::decode(&offer, ProtocolVersion::V1).unwrap().challenge;
    assert!(decoded.verify_challenge(&challenge, ProtocolVersion::V1));
    assert!(!decoded.verify_challenge(&challenge, ProtocolVersion::V2));

    alice.scan_ack(&ack).await.unwrap();
    let v = bob_store.voucher(&bon_id).await.unwrap().unwrap();
    assert_eq!(v.issuer_name, "");
}

#[tokio::test]
async fn base64_qr_text_round_trips_through_devices() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device(&relay);
    let (bob, _) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;

    let offer_text = qr::encode_base64(&alice.create_offer(&bon_id).await.unwrap());
    let ack = accepted_ack(
        bob.receive_offer(offer_text.as_bytes())
            .await
            .unwrap()
            .processed()
            .unwrap(),
    );
    let ack_text = qr::encode_base64(&ack);
    assert!(alice.scan_ack(ack_text.as_bytes()).await.is_ok());
}

// ---------------------------------------------------------------------------
// Idempotence & Expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rescanning_an_offer_is_a_no_op() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device(&relay);
    let (bob, bob_store) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer = alice.create_offer(&bon_id).await.unwrap();

    let first = accepted_ack(bob.receive_offer(&offer).await.unwrap().processed().unwrap());
    assert_eq!(bob.reconstructions(), 1);

    match bob.receive_offer(&offer).await.unwrap().processed().unwrap() {
        ReceiveOutcome::AlreadyProcessed { ack } => assert_eq!(ack, first),
        ReceiveOutcome::Accepted { .. } => panic!("offer processed twice"),
    }
    assert_eq!(bob.reconstructions(), 1);
    assert_eq!(bob_store.audit_log().await.unwrap().len(), 1);
}

#[tokio::test]
async fn stale_offer_is_rejected_and_regeneration_fixes_it() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device_with(
        &relay,
        TransferConfig {
            offer_ttl_secs: 1,
            ..fast_config(ProtocolVersion::V2)
        },
    );
    let (bob, _) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;

    let stale = alice.create_offer(&bon_id).await.unwrap();
    // TTL is checked in whole seconds: timestamp + 1 must be in the past.
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let err = bob.receive_offer(&stale).await.unwrap_err();
    assert!(matches!(err, TransferError::OfferExpired { .. }));
    assert_eq!(err.user_action(), UserAction::Regenerate);
    assert!(alice.current_offer().is_none());

    let fresh = alice.create_offer(&bon_id).await.unwrap();
    assert_ne!(fresh, stale);
    let ack = accepted_ack(bob.receive_offer(&fresh).await.unwrap().processed().unwrap());
    assert!(alice.scan_ack(&ack).await.is_ok());
}

// ---------------------------------------------------------------------------
// Failure Paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn commit_survives_publish_failure_and_outbox_flushes_later() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, alice_store) = device(&relay);
    let (bob, _) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(300), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer = alice.create_offer(&bon_id).await.unwrap();
    let ack = accepted_ack(bob.receive_offer(&offer).await.unwrap().processed().unwrap());

    relay.set_offline(true);
    let commit = alice.scan_ack(&ack).await.unwrap().processed().unwrap();
    assert_eq!(commit.publish, PublishStatus::PendingPublish);
    assert_eq!(commit.record.status, TransferStatus::CompletedOffline);

    // The commit is final regardless.
    assert!(alice_store.share(&bon_id, ShareRole::Carrier).await.unwrap().is_none());
    assert_eq!(alice_store.pending_publishes().await.unwrap().len(), 1);

    // Still offline: nothing moves.
    let report = alice.flush_outbox().await.unwrap();
    assert_eq!((report.published, report.remaining), (0, 1));

    relay.set_offline(false);
    let report = alice.flush_outbox().await.unwrap();
    assert_eq!((report.published, report.remaining), (1, 0));
    assert!(alice_store.pending_publishes().await.unwrap().is_empty());

    let records = relay.events_of_kind(WitnessEventKind::TransferRecord);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transfer().unwrap().status, TransferStatus::CompletedOffline);
}

#[tokio::test]
async fn offline_issuance_is_queued() {
    let relay = Arc::new(MemoryRelay::new());
    relay.set_offline(true);
    let (alice, _) = device(&relay);
    let out = alice.issue(Amount::from_centimes(100), "A", "").await.unwrap();
    assert_eq!(out.publish, PublishStatus::PendingPublish);
    assert!(relay.events().is_empty());

    relay.set_offline(false);
    alice.flush_outbox().await.unwrap();
    assert!(relay.fetch(&out.voucher.bon_id).await.is_some());
}

#[tokio::test]
async fn missing_witness_share_asks_for_resync() {
    let relay = Arc::new(MemoryRelay::new());
    relay.set_offline(true);
    let (alice, _) = device(&relay);
    let (bob, _) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer = alice.create_offer(&bon_id).await.unwrap();

    let err = bob.receive_offer(&offer).await.unwrap_err();
    assert!(matches!(err, TransferError::MissingWitnessShare));
    assert_eq!(err.user_action(), UserAction::Resync);
    assert_eq!(bob.recipient_state(), RecipientState::ScanningOffer);

    // Once the issuer's outbox drains, the same offer goes through.
    relay.set_offline(false);
    alice.flush_outbox().await.unwrap();
    assert!(bob.receive_offer(&offer).await.is_ok());
}

#[tokio::test]
async fn donor_without_cached_witness_share_cannot_offer() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, alice_store) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    alice_store.delete_share(&bon_id, ShareRole::Witness).await.unwrap();

    let err = alice.create_offer(&bon_id).await.unwrap_err();
    assert!(matches!(err, TransferError::MissingShare("witness")));
    assert_eq!(err.user_action(), UserAction::Resync);

    // Resync pulls it back from the relay.
    alice.witness_share(&bon_id).await.unwrap();
    assert!(alice.create_offer(&bon_id).await.is_ok());
}

#[tokio::test]
async fn wrong_witness_share_is_tampering() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device(&relay);
    let (bob, bob_store) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer = alice.create_offer(&bon_id).await.unwrap();

    // Poison Bob's cache with some other voucher's witness share.
    let other = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let foreign = alice.witness_share(&other).await.unwrap();
    bob_store.save_share(&bon_id, foreign).await.unwrap();

    let err = bob.receive_offer(&offer).await.unwrap_err();
    assert!(matches!(err, TransferError::TamperedOrWrongShare));
    assert_eq!(err.user_action(), UserAction::Resync);
    assert!(bob_store.voucher(&bon_id).await.unwrap().is_none());
    assert_eq!(bob.reconstructions(), 0);

    // The bad share was evicted, so the next scan fetches the real one.
    assert!(bob_store.share(&bon_id, ShareRole::Witness).await.unwrap().is_none());
    let ack = accepted_ack(bob.receive_offer(&offer).await.unwrap().processed().unwrap());
    assert_eq!(ack.len(), 97);
    assert!(bob_store.share(&bon_id, ShareRole::Witness).await.unwrap().is_some());
    assert_eq!(bob.reconstructions(), 1);
}

#[tokio::test]
async fn later_junk_distribution_does_not_shadow_the_real_share() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device(&relay);
    let (bob, bob_store) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;

    // Another market member posts a well-formed but useless share for the
    // same voucher, a minute after issuance.
    let mallory = BonKeypair::generate();
    let key = MarketKey::from_seed(SEED);
    let junk = seal_share(&[0x42; 32], key.as_bytes()).unwrap();
    let later = chrono::Utc::now() + chrono::Duration::seconds(60);
    let event = WitnessEvent::share_distribution(&mallory, "riverside", bon_id, &junk, later);
    assert!(relay.publish(&event).await);
    assert_eq!(relay.events_of_kind(WitnessEventKind::ShareDistribution).len(), 2);

    let offer = alice.create_offer(&bon_id).await.unwrap();
    let outcome = bob.receive_offer(&offer).await.unwrap().processed().unwrap();
    assert!(matches!(outcome, ReceiveOutcome::Accepted { .. }));
    assert!(bob_store.share(&bon_id, ShareRole::Witness).await.unwrap().is_some());
}

#[tokio::test]
async fn unmatched_fetched_share_is_not_cached() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device(&relay);
    let (bob, bob_store) = device(&relay);

    // Only a junk distribution ever reached the relay for this voucher.
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer = alice.create_offer(&bon_id).await.unwrap();
    let lonely = Arc::new(MemoryRelay::new());
    let junk = seal_share(&[0x42; 32], MarketKey::from_seed(SEED).as_bytes()).unwrap();
    let event = WitnessEvent::share_distribution(
        &BonKeypair::generate(),
        "riverside",
        bon_id,
        &junk,
        chrono::Utc::now(),
    );
    assert!(lonely.publish(&event).await);
    let (carol, carol_store) = device(&lonely);

    let err = carol.receive_offer(&offer).await.unwrap_err();
    assert!(matches!(err, TransferError::TamperedOrWrongShare));
    assert!(carol_store.share(&bon_id, ShareRole::Witness).await.unwrap().is_none());

    // Bob, on the real relay, is unaffected.
    bob.receive_offer(&offer).await.unwrap();
    assert!(bob_store.voucher(&bon_id).await.unwrap().is_some());
}

#[tokio::test]
async fn forged_ack_leaves_the_donor_untouched() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, alice_store) = device(&relay);
    let (bob, _) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer_bytes = alice.create_offer(&bon_id).await.unwrap();
    let offer = OfferPayload::decode(&offer_bytes, ProtocolVersion::V2).unwrap();

    let mut forged = accepted_ack(bob.receive_offer(&offer_bytes).await.unwrap().processed().unwrap());
    forged[40] ^= 0x01;
    let err = alice.scan_ack(&forged).await.unwrap_err();
    assert!(matches!(err, TransferError::SignatureMismatch(_)));
    assert_eq!(err.user_action(), UserAction::Retry);
    assert_eq!(alice.donor_state(), Some(DonorState::OfferReady));
    assert!(alice_store.share(&bon_id, ShareRole::Carrier).await.unwrap().is_some());

    // An ack for a different voucher is refused too.
    let stranger = BonKeypair::generate();
    let wrong_voucher = AckPayload {
        bon_id: stranger.public_key(),
        status: bon_protocol::qr::AckStatus::Accepted,
        signature: stranger.sign(&ProtocolVersion::V2.ack_message(&offer.challenge)),
    }
    .encode();
    assert!(alice.scan_ack(&wrong_voucher).await.is_err());

    // The genuine ack still works: the challenge was not consumed.
    let genuine = match bob.receive_offer(&offer_bytes).await.unwrap().processed().unwrap() {
        ReceiveOutcome::AlreadyProcessed { ack } => ack,
        ReceiveOutcome::Accepted { .. } => panic!("expected cached ack"),
    };
    assert!(alice.scan_ack(&genuine).await.is_ok());
}

#[tokio::test]
async fn truncated_payloads_ask_for_rescan() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device(&relay);
    let (bob, _) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer = alice.create_offer(&bon_id).await.unwrap();

    let err = bob.receive_offer(&offer[..offer.len() - 1]).await.unwrap_err();
    assert!(matches!(err, TransferError::PayloadFormat(_)));
    assert_eq!(err.user_action(), UserAction::Rescan);
}

#[tokio::test]
async fn expired_market_membership_blocks_exchanges() {
    let relay = Arc::new(MemoryRelay::new());
    let (alice, _) = device(&relay);
    let bon_id = alice
        .issue(Amount::from_centimes(100), "A", "")
        .await
        .unwrap()
        .voucher
        .bon_id;
    let offer = alice.create_offer(&bon_id).await.unwrap();

    let lapsed = Market::new("riverside", "mem://", MarketKey::from_seed(SEED))
        .with_expiry(chrono::Utc::now() - chrono::Duration::days(1));
    let bob = Device::new(
        BonKeypair::generate(),
        lapsed,
        fast_config(ProtocolVersion::V2),
        Arc::new(MemoryStore::new()),
        relay.clone(),
    );
    assert!(matches!(
        bob.receive_offer(&offer).await,
        Err(TransferError::MarketExpired(_))
    ));
    assert!(matches!(
        bob.issue(Amount::from_centimes(1), "B", "").await,
        Err(TransferError::MarketExpired(_))
    ));
}
