//! # Witness Network
//!
//! The public, append-only relay network that remembers two things: the
//! sealed witness share of every voucher, and the record of every transfer.
//!
//! ```text
//! mod.rs           — WitnessNetwork trait
//! event.rs         — WitnessEvent: signed, content-addressed relay events
//! distribution.rs  — fetch + open a witness share under K_market
//! memory.rs        — MemoryRelay, an in-process relay for tests and the CLI
//! ```
//!
//! The network is a witness, not an authority. Nothing in the transfer
//! protocol waits for it: a donor commits locally, then publishes; if the
//! relay is unreachable the event goes to the outbox and is retried later.
//!
//! Transport (websockets, relay selection, subscriptions) is the adapter's
//! business. The protocol only needs the four calls on [`WitnessNetwork`].

pub mod distribution;
pub mod event;
pub mod memory;

use async_trait::async_trait;

use crate::crypto::encryption::EncryptedShare;
use crate::crypto::keys::BonId;

pub use distribution::{fetch_witness_share, open_witness_share};
pub use event::{WitnessEvent, WitnessEventKind};
pub use memory::MemoryRelay;

/// A connection to the witness relays.
///
/// Every method reports failure as `false` / `None` rather than an error:
/// the caller's reaction is always the same (queue and retry later), so the
/// reason only matters to the adapter's own logs.
#[async_trait]
pub trait WitnessNetwork: Send + Sync {
    async fn connect(&self, endpoint: &str) -> bool;

    /// `true` once the relay has accepted the event.
    async fn publish(&self, event: &WitnessEvent) -> bool;

    /// Latest sealed witness share for `bon_id`, if any relay has one.
    async fn fetch(&self, bon_id: &BonId) -> Option<EncryptedShare>;

    async fn disconnect(&self);
}
