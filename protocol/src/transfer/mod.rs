//! # Transfer Protocol
//!
//! A two-QR challenge–response exchange that moves a voucher from one phone
//! to another with no network at all.
//!
//! ```text
//!   ┌──────────┐                                 ┌───────────┐
//!   │  Donor   │                                 │ Recipient │
//!   └────┬─────┘                                 └─────┬─────┘
//!        │  carrier + cached witness → key K           │
//!        │                                             │
//!        │  1. Offer QR                                │
//!        │     bonId, value, Enc_{H(W)}(carrier),      │
//!        │     challenge, Sig_K(...), ts, ttl          │
//!        ├────────────────────────────────────────────►│
//!        │                                             │  W from cache or relay
//!        │                                             │  carrier = Dec_{H(W)}
//!        │                                             │  K = combine(carrier, W)
//!        │  2. Ack QR                                  │
//!        │     bonId, accepted, Sig_K(challenge)       │
//!        │◄────────────────────────────────────────────┤
//!        │                                             │
//!        │  verify under bonId                         │
//!        │  delete carrier, mark spent                 │
//!        │  publish TransferRecord ──► witness relays  │
//! ```
//!
//! The ack signature proves the recipient rebuilt the same key, which means
//! they now hold a working carrier share. The donor deleting its own copy is
//! what makes the voucher move rather than copy.
//!
//! ## Layout
//!
//! ```text
//! donor.rs      — DonorSession state machine (pure)
//! recipient.rs  — RecipientSession state machine (pure)
//! device.rs     — Device: sessions + store + witness network (async)
//! challenge.rs  — single-use challenges, wire timestamps
//! record.rs     — TransferRecord published after a commit
//! error.rs      — TransferError and the UserAction each one maps to
//! ```

pub mod challenge;
pub mod device;
pub mod donor;
pub mod error;
pub mod recipient;
pub mod record;

pub use challenge::{Challenge, ChallengeLog};
pub use device::{
    CommitOutcome, Device, FlushReport, IssueOutcome, PublishStatus, ReceiveOutcome, ScanOutcome,
};
pub use donor::{AcceptedAck, DonorSession, DonorState};
pub use error::{TransferError, UserAction};
pub use recipient::{ReceivedVoucher, RecipientSession, RecipientState, ScanStep, VerifiedOffer};
pub use record::{TransferRecord, TransferStatus};
