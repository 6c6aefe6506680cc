//! # Transfer Simulation
//!
//! Two devices and one in-memory relay, in one process. The issuer mints a
//! voucher, shows an offer, the second device scans it and answers, and the
//! issuer commits. Every QR payload is printed so it can be fed back into
//! `inspect-offer` and `inspect-ack`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;

use bon_protocol::crypto::keys::BonKeypair;
use bon_protocol::qr::{self, ProtocolVersion};
use bon_protocol::storage::MemoryStore;
use bon_protocol::transfer::{PublishStatus, ReceiveOutcome, TransferRecord};
use bon_protocol::voucher::{Amount, MarketKey};
use bon_protocol::witness::{MemoryRelay, WitnessEventKind};
use bon_protocol::{Device, TransferConfig};

use crate::cli::SimulateArgs;

/// What gets printed on stdout at the end.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub bon_id: String,
    pub value: String,
    pub protocol_version: ProtocolVersion,
    pub offer_base64: String,
    pub offer_len: usize,
    pub ack_base64: String,
    pub record: TransferRecord,
    pub published_immediately: bool,
    pub relay_events: usize,
}

pub fn load_config(path: Option<&Path>) -> Result<TransferConfig> {
    let Some(path) = path else {
        return Ok(TransferConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn market_key(seed_hex: Option<&str>) -> Result<MarketKey> {
    match seed_hex {
        Some(hex_seed) => {
            let seed = hex::decode(hex_seed.trim()).context("market seed is not hex")?;
            if seed.is_empty() {
                bail!("market seed is empty");
            }
            Ok(MarketKey::from_seed(&seed))
        }
        None => {
            let seed: [u8; 32] = rand::random();
            info!("no market seed given, using a random one");
            Ok(MarketKey::from_seed(&seed))
        }
    }
}

async fn open_device(
    args: &SimulateArgs,
    key: &MarketKey,
    config: &TransferConfig,
    relay: &Arc<MemoryRelay>,
) -> Result<Device> {
    let store = Arc::new(MemoryStore::with_market_key(key.clone()));
    let device = Device::open(
        BonKeypair::generate(),
        &args.market_name,
        &args.relay,
        config.clone(),
        store,
        relay.clone(),
    )
    .await?;
    device.connect().await;
    Ok(device)
}

pub async fn run(args: SimulateArgs) -> Result<SimulationReport> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(v) = args.wire_version {
        config.protocol_version = v.into();
    }
    let value: Amount = args
        .value
        .parse()
        .with_context(|| format!("invalid value {:?}", args.value))?;
    let key = market_key(args.market_seed.as_deref())?;

    let relay = Arc::new(MemoryRelay::new());
    let issuer = open_device(&args, &key, &config, &relay).await?;
    let holder = open_device(&args, &key, &config, &relay).await?;
    info!(
        issuer = %issuer.identity().short(),
        holder = %holder.identity().short(),
        version = %config.protocol_version,
        "devices ready"
    );

    let issued = issuer.issue(value, &args.issuer_name, &args.category).await?;
    let bon_id = issued.voucher.bon_id;
    info!(bon_id = %bon_id.short(), value = %value, "voucher issued");

    let offer = issuer.create_offer(&bon_id).await?;
    let ack = match holder.receive_offer(&offer).await?.processed() {
        Some(ReceiveOutcome::Accepted { ack, .. }) => ack,
        Some(ReceiveOutcome::AlreadyProcessed { ack }) => ack,
        None => bail!("offer scan was ignored"),
    };

    if args.offline {
        relay.set_offline(true);
        info!("relay taken offline before commit");
    }
    let Some(commit) = issuer.scan_ack(&ack).await?.processed() else {
        bail!("acknowledgement scan was ignored");
    };
    let published_immediately = commit.publish == PublishStatus::Published;

    if args.offline {
        relay.set_offline(false);
        let report = issuer.flush_outbox().await?;
        info!(published = report.published, remaining = report.remaining, "relay back online");
    }
    holder.await_success().await?;

    Ok(SimulationReport {
        bon_id: bon_id.to_hex(),
        value: value.to_string(),
        protocol_version: config.protocol_version,
        offer_base64: qr::encode_base64(&offer),
        offer_len: offer.len(),
        ack_base64: qr::encode_base64(&ack),
        record: commit.record,
        published_immediately,
        relay_events: relay.events_of_kind(WitnessEventKind::TransferRecord).len(),
    })
}
