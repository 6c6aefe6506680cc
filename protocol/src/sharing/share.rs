//! Share roles and the zeroizing share container.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::SHARE_LENGTH;

/// Which of the three fragments a share is.
///
/// The role doubles as the share index, so a share never needs to carry
/// its index on the wire: both sides already know which role a field in the
/// offer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareRole {
    /// Kept by the issuer for recovery. Never transmitted.
    Anchor,
    /// Travels with the current holder; deleted by the donor on transfer.
    Carrier,
    /// Published, sealed under the market key. Never deleted.
    Witness,
}

impl ShareRole {
    /// Position of this role in a three-share split.
    pub fn index(self) -> usize {
        match self {
            ShareRole::Anchor => 0,
            ShareRole::Carrier => 1,
            ShareRole::Witness => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShareRole::Anchor => "anchor",
            ShareRole::Carrier => "carrier",
            ShareRole::Witness => "witness",
        }
    }
}

impl fmt::Display for ShareRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One 32-byte fragment of a voucher private key.
///
/// Wiped on drop. `Debug` redacts the bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretShare {
    #[zeroize(skip)]
    role: ShareRole,
    bytes: [u8; SHARE_LENGTH],
}

impl SecretShare {
    pub fn new(role: ShareRole, bytes: [u8; SHARE_LENGTH]) -> Self {
        Self { role, bytes }
    }

    pub fn role(&self) -> ShareRole {
        self.role
    }

    pub fn as_bytes(&self) -> &[u8; SHARE_LENGTH] {
        &self.bytes
    }
}

impl fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretShare")
            .field("role", &self.role)
            .field("bytes", &"***")
            .finish()
    }
}

/// Persisted form. Stores encrypt at rest; that part is outside this crate.
#[derive(Serialize, Deserialize)]
struct ShareRepr {
    role: ShareRole,
    bytes: String,
}

impl Serialize for SecretShare {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut repr = ShareRepr {
            role: self.role,
            bytes: hex::encode(self.bytes),
        };
        let result = repr.serialize(serializer);
        repr.bytes.zeroize();
        result
    }
}

impl<'de> Deserialize<'de> for SecretShare {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut repr = ShareRepr::deserialize(deserializer)?;
        let mut decoded = hex::decode(&repr.bytes).map_err(serde::de::Error::custom)?;
        repr.bytes.zeroize();
        let bytes: Result<[u8; SHARE_LENGTH], _> = decoded.as_slice().try_into();
        decoded.zeroize();
        let bytes = bytes.map_err(|_| serde::de::Error::custom("share must be 32 bytes"))?;
        Ok(Self::new(repr.role, bytes))
    }
}

/// The three shares produced by one split.
#[derive(Debug, Clone)]
pub struct ShareSet {
    pub anchor: SecretShare,
    pub carrier: SecretShare,
    pub witness: SecretShare,
}
