// Copyright (c) 2026 Bon Contributors. MIT License.
// See LICENSE for details.

//! # Bon CLI
//!
//! Entry point for the `bon` binary.
//!
//! - `simulate`      — run a full issue → offer → ack → commit cycle
//! - `inspect-offer` — decode an offer, check its signature and expiry
//! - `inspect-ack`   — decode an acknowledgement, optionally verify it
//! - `new-market`    — print a fresh market seed and its derived key
//! - `version`       — print build version information

mod cli;
mod logging;
mod simulate;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;

use bon_protocol::qr::{self, AckPayload, OfferPayload, ProtocolVersion};
use bon_protocol::voucher::MarketKey;

use cli::{BonCli, Commands, InspectAckArgs, InspectOfferArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BonCli::parse();
    logging::init_logging("bon=info,bon_protocol=info", cli.log_format);

    match cli.command {
        Commands::Simulate(args) => {
            let report = simulate::run(args).await?;
            print_json(&report)
        }
        Commands::InspectOffer(args) => inspect_offer(args),
        Commands::InspectAck(args) => inspect_ack(args),
        Commands::NewMarket => new_market(),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Hex first, then whatever a QR scanner would have produced.
fn payload_bytes(input: &str) -> Vec<u8> {
    let trimmed = input.trim();
    match hex::decode(trimmed) {
        Ok(bytes) => bytes,
        Err(_) => qr::from_scanned(trimmed.as_bytes()).into_owned(),
    }
}

fn inspect_offer(args: InspectOfferArgs) -> Result<()> {
    let version: ProtocolVersion = args.wire_version.into();
    let bytes = payload_bytes(&args.payload);
    let offer = OfferPayload::decode(&bytes, version)
        .with_context(|| format!("not a {version} offer ({} bytes)", bytes.len()))?;
    let now = Utc::now().timestamp().max(0) as u64;

    tracing::debug!(bon_id = %offer.bon_id.short(), "offer decoded");
    print_json(&json!({
        "offer": offer,
        "signature_valid": offer.verify_signature(),
        "expires_at": offer.expires_at(),
        "expired": offer.is_expired(now),
    }))
}

fn inspect_ack(args: InspectAckArgs) -> Result<()> {
    let version: ProtocolVersion = args.wire_version.into();
    let bytes = payload_bytes(&args.payload);
    let ack = AckPayload::decode(&bytes, version).context("not an acknowledgement")?;

    let verified = match args.challenge.as_deref() {
        Some(hex_challenge) => {
            let challenge: [u8; 16] = hex::decode(hex_challenge.trim())
                .context("challenge is not hex")?
                .try_into()
                .map_err(|v: Vec<u8>| anyhow!("challenge must be 16 bytes, got {}", v.len()))?;
            Some(ack.verify_challenge(&challenge, version))
        }
        None => None,
    };

    print_json(&json!({
        "ack": ack,
        "signature_valid": verified,
    }))
}

fn new_market() -> Result<()> {
    let seed: [u8; 32] = rand::random();
    let key = MarketKey::from_seed(&seed);
    print_json(&json!({
        "market_seed": hex::encode(seed),
        "market_key": hex::encode(key.as_bytes()),
    }))
}

fn print_version() {
    println!("bon {}", env!("CARGO_PKG_VERSION"));
    println!("  offer layouts : v1 (213 bytes), v2 (214 + name bytes)");
    println!("  ack length    : {} bytes", bon_protocol::config::ACK_PAYLOAD_LENGTH);
}
