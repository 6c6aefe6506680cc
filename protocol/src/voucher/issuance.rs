//! Minting a voucher.
//!
//! ```text
//!   generate keypair ─► split seed ─► anchor  (stays with issuer)
//!                                 ├─► carrier (stays with holder, = issuer for now)
//!                                 └─► witness ─► seal under K_market ─► publish
//! ```
//!
//! The full seed only exists inside this function; it is wiped before the
//! function returns.

use chrono::{DateTime, Duration, Utc};

use crate::config::MAX_ISSUER_NAME_LENGTH;
use crate::crypto::encryption::{seal_share, EncryptedShare};
use crate::crypto::keys::{BonKeypair, BonPublicKey};
use crate::crypto::signatures::derive_public_key;
use crate::qr::PayloadFormatError;
use crate::sharing::{combine, split, SecretShare};
use crate::transfer::TransferError;

use super::{Amount, Market, Rarity, Voucher, VoucherStatus};

/// What the issuer asks for.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub value: Amount,
    pub issuer_name: String,
    pub category: String,
    /// Lifetime of the new voucher in days.
    pub lifetime_days: u32,
}

/// Everything minting produces. The caller persists the voucher and anchor,
/// caches the witness share, and publishes `sealed_witness`.
#[derive(Debug)]
pub struct IssuedVoucher {
    pub voucher: Voucher,
    pub anchor: SecretShare,
    pub witness: SecretShare,
    pub sealed_witness: EncryptedShare,
}

/// Mint a new voucher in `market`.
pub fn issue_voucher(
    issuer: &BonPublicKey,
    market: &Market,
    request: IssueRequest,
    now: DateTime<Utc>,
) -> Result<IssuedVoucher, TransferError> {
    if !market.is_active(now) {
        return Err(TransferError::MarketExpired(market.name.clone()));
    }
    if request.issuer_name.len() > MAX_ISSUER_NAME_LENGTH {
        return Err(PayloadFormatError::IssuerNameTooLong(request.issuer_name.len()).into());
    }

    let expires_at = Duration::try_days(i64::from(request.lifetime_days))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or(TransferError::LifetimeOutOfRange(request.lifetime_days))?;

    let voucher_key = BonKeypair::generate();
    let bon_id = voucher_key.public_key();
    let shares = {
        let seed = voucher_key.secret_seed();
        split(seed.as_slice())?
    };
    drop(voucher_key);

    // The carrier and witness pair is what every later holder will use.
    let rebuilt = combine(&shares.carrier, &shares.witness)?;
    if derive_public_key(rebuilt.as_slice())? != bon_id {
        return Err(TransferError::TamperedOrWrongShare);
    }

    let sealed_witness = seal_share(shares.witness.as_bytes(), market.key.as_bytes())?;

    let voucher = Voucher {
        bon_id,
        value: request.value,
        issuer: *issuer,
        issuer_name: request.issuer_name,
        created_at: now,
        expires_at: Some(expires_at),
        status: VoucherStatus::Active,
        market: market.name.clone(),
        carrier_share: Some(shares.carrier.clone()),
        category: request.category,
        rarity: Rarity::for_bon(&bon_id),
    };

    Ok(IssuedVoucher {
        voucher,
        anchor: shares.anchor.clone(),
        witness: shares.witness.clone(),
        sealed_witness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encryption::open_share;
    use crate::sharing::{combine, recover_with_anchor};
    use crate::voucher::MarketKey;

    fn market() -> Market {
        Market::new("village", "mem://", MarketKey::from_seed(b"test seed"))
    }

    fn request() -> IssueRequest {
        IssueRequest {
            value: Amount::from_centimes(2_000),
            issuer_name: "Mill Street Bakery".into(),
            category: "food".into(),
            lifetime_days: 365,
        }
    }

    #[test]
    fn issued_shares_reconstruct_the_bon_key() {
        let issuer = BonKeypair::generate().public_key();
        let issued = issue_voucher(&issuer, &market(), request(), Utc::now()).unwrap();
        let carrier = issued.voucher.carrier_share.as_ref().unwrap();

        let seed = combine(carrier, &issued.witness).unwrap();
        assert_eq!(BonKeypair::from_seed(&seed).public_key(), issued.voucher.bon_id);

        let seed = recover_with_anchor(&issued.anchor, &issued.witness).unwrap();
        assert_eq!(BonKeypair::from_seed(&seed).public_key(), issued.voucher.bon_id);
    }

    #[test]
    fn sealed_witness_opens_under_market_key() {
        let issuer = BonKeypair::generate().public_key();
        let m = market();
        let issued = issue_voucher(&issuer, &m, request(), Utc::now()).unwrap();
        let opened = open_share(&issued.sealed_witness, m.key.as_bytes()).unwrap();
        assert_eq!(&*opened, issued.witness.as_bytes());
    }

    #[test]
    fn issued_vouchers_expire() {
        let issuer = BonKeypair::generate().public_key();
        let now = Utc::now();
        let issued = issue_voucher(&issuer, &market(), request(), now).unwrap();
        assert_eq!(issued.voucher.expires_at, Some(now + Duration::days(365)));
        assert!(issued.voucher.is_expired(now + Duration::days(366)));
    }

    #[test]
    fn lifetime_past_the_calendar_is_rejected() {
        let issuer = BonKeypair::generate().public_key();
        let mut req = request();
        req.lifetime_days = u32::MAX;
        assert!(matches!(
            issue_voucher(&issuer, &market(), req, Utc::now()),
            Err(TransferError::LifetimeOutOfRange(u32::MAX))
        ));
    }

    #[test]
    fn expired_market_cannot_mint() {
        let issuer = BonKeypair::generate().public_key();
        let now = Utc::now();
        let m = market().with_expiry(now - Duration::seconds(1));
        assert!(matches!(
            issue_voucher(&issuer, &m, request(), now),
            Err(TransferError::MarketExpired(_))
        ));
    }

    #[test]
    fn overlong_issuer_name_is_rejected() {
        let issuer = BonKeypair::generate().public_key();
        let mut req = request();
        req.issuer_name = "x".repeat(65);
        assert!(issue_voucher(&issuer, &market(), req, Utc::now()).is_err());
    }
}
