//! # CLI Interface
//!
//! Command-line structure for the `bon` binary, via `clap` derive.

use std::path::PathBuf;

use bon_protocol::qr::ProtocolVersion;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::logging::LogFormat;

/// Bon voucher tools.
///
/// Inspects offer and acknowledgement QR payloads, and runs a complete
/// two-device transfer against an in-memory witness relay.
#[derive(Parser, Debug)]
#[command(name = "bon", about = "Bon bearer voucher tools", version, propagate_version = true)]
pub struct BonCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "BON_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Issue a voucher on one simulated phone and hand it to another.
    Simulate(SimulateArgs),
    /// Decode and verify an offer payload.
    InspectOffer(InspectOfferArgs),
    /// Decode an acknowledgement payload, optionally checking it against a
    /// challenge.
    InspectAck(InspectAckArgs),
    /// Generate a fresh market seed and print the derived market key.
    NewMarket,
    /// Print version information and exit.
    Version,
}

/// Wire layout selector. Mirrors `ProtocolVersion`, which does not know
/// about clap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WireVersion {
    V1,
    V2,
}

impl From<WireVersion> for ProtocolVersion {
    fn from(v: WireVersion) -> Self {
        match v {
            WireVersion::V1 => ProtocolVersion::V1,
            WireVersion::V2 => ProtocolVersion::V2,
        }
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Voucher value, e.g. `12.50`.
    #[arg(long, default_value = "10.00")]
    pub value: String,

    /// Issuer display name carried in V2 offers.
    #[arg(long, default_value = "Market Stall")]
    pub issuer_name: String,

    /// Free-form voucher category.
    #[arg(long, default_value = "")]
    pub category: String,

    /// Hex-encoded market seed shared by everyone in the market.
    ///
    /// A random seed is used when omitted.
    #[arg(long, env = "BON_MARKET_SEED")]
    pub market_seed: Option<String>,

    /// Market display name.
    #[arg(long, env = "BON_MARKET_NAME", default_value = "local")]
    pub market_name: String,

    /// Relay endpoint recorded for the market. The simulation never dials it.
    #[arg(long, env = "BON_RELAY", default_value = "mem://local")]
    pub relay: String,

    /// Path to a JSON `TransferConfig`. Missing fields take defaults.
    #[arg(long, short = 'c', env = "BON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured wire version.
    #[arg(long, value_enum)]
    pub wire_version: Option<WireVersion>,

    /// Take the relay offline before the donor commits, then flush the
    /// outbox once it is back.
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug)]
pub struct InspectOfferArgs {
    /// Offer payload as base64 or hex.
    pub payload: String,

    /// Layout to decode with.
    #[arg(long = "wire-version", value_enum, default_value_t = WireVersion::V2)]
    pub wire_version: WireVersion,
}

#[derive(Args, Debug)]
pub struct InspectAckArgs {
    /// Acknowledgement payload as base64 or hex.
    pub payload: String,

    /// Hex challenge from the matching offer. When given, the signature is
    /// checked against it.
    #[arg(long)]
    pub challenge: Option<String>,

    /// Which signing rule to check the signature under.
    #[arg(long = "wire-version", value_enum, default_value_t = WireVersion::V2)]
    pub wire_version: WireVersion,
}
