//! Witness share distribution.
//!
//! Sealing happens at issuance (see `voucher::issuance`). This side is the
//! retrieval path any market member uses to turn a `bonId` into a usable
//! witness share.

use tracing::{debug, warn};

use crate::crypto::encryption::{open_share, EncryptedShare};
use crate::crypto::keys::BonId;
use crate::sharing::{SecretShare, ShareRole};
use crate::transfer::TransferError;
use crate::voucher::MarketKey;

use super::WitnessNetwork;

/// Open a sealed witness share with `K_market`.
pub fn open_witness_share(
    sealed: &EncryptedShare,
    market_key: &MarketKey,
) -> Result<SecretShare, TransferError> {
    let bytes = open_share(sealed, market_key.as_bytes())?;
    Ok(SecretShare::new(ShareRole::Witness, *bytes))
}

/// Fetch and open the witness share for `bon_id`.
///
/// `MissingWitnessShare` if no relay has it. A share that is there but does
/// not open under this market's key is an `AuthenticationFailure`: it was
/// published in a different market.
pub async fn fetch_witness_share(
    network: &dyn WitnessNetwork,
    bon_id: &BonId,
    market_key: &MarketKey,
) -> Result<SecretShare, TransferError> {
    let Some(sealed) = network.fetch(bon_id).await else {
        warn!(bon_id = %bon_id.short(), "witness share not found on relays");
        return Err(TransferError::MissingWitnessShare);
    };
    let share = open_witness_share(&sealed, market_key)?;
    debug!(bon_id = %bon_id.short(), "witness share fetched and opened");
    Ok(share)
}
