// Copyright (c) 2026 Bon Contributors. MIT License.
// See LICENSE for details.

//! # Bon Protocol — Core Library
//!
//! Bearer vouchers for local markets that move phone to phone over two QR
//! codes, with no server in the loop.
//!
//! A voucher ("bon") *is* an Ed25519 keypair. Its public key is the
//! voucher's identifier; its private key is never stored anywhere whole.
//! Instead it is split 2-of-3:
//!
//! ```text
//!                    ┌─ anchor   issuer keeps it, for recovery
//!   voucher key ─────┼─ carrier  the current holder has it
//!                    └─ witness  sealed under the market key, published
//! ```
//!
//! Holding the carrier share, plus the witness share anyone in the market
//! can fetch, is ownership. Transferring is proving you can rebuild the key,
//! handing the carrier share over encrypted, watching the recipient prove
//! they can rebuild it too, and then deleting your own copy.
//!
//! ## Architecture
//!
//! - **crypto** — Ed25519, AES-256-GCM share sealing, hashes.
//! - **sharing** — 2-of-3 Shamir via `bc-shamir` and scoped ephemeral keys.
//! - **voucher** — the voucher record, amounts, markets, issuance.
//! - **qr** — the offer and acknowledgement binary layouts.
//! - **transfer** — donor and recipient state machines, plus the `Device`
//!   adapter that drives them against storage and the network.
//! - **witness** — signed relay events and witness share distribution.
//! - **storage** — the device persistence trait and an in-memory store.
//! - **config** — wire constants and runtime tunables.
//!
//! ## What this is not
//!
//! There is no consensus. A device that refuses to delete its carrier share
//! can spend a voucher twice; the public transfer records make that visible
//! after the fact, nothing more.

pub mod config;
pub mod crypto;
pub mod qr;
pub mod sharing;
pub mod storage;
pub mod transfer;
pub mod voucher;
pub mod witness;

pub use config::TransferConfig;
pub use transfer::{Device, TransferError};
