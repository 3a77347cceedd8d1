//! external (public) data of a transaction
//!
//! everything the pool acts on outside the shielded set: where withdrawn
//! tokens go, who is paid the fee, the signed public amount and the
//! encrypted outputs. the proof commits to `hash()` of this struct so none
//! of it can be swapped after proving.

use core::fmt;
use core::str::FromStr;

use rand::RngCore;
use scale_codec::Encode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::value::{self, Amount};
use crate::EXT_DATA_DOMAIN;

/// public account on the settlement layer
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, scale_codec::Encode, scale_codec::Decode)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    /// deterministic address for a label, handy for well-known accounts
    pub fn derive(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        Self(bytes)
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{}..)", hex::encode(&self.0[..4]))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| Error::Config(format!("address {s}: {e}")))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| Error::Config(format!("address {s}: expected 20 bytes")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

bytes32!(
    /// binding of ExtData into the proof's public inputs
    ExtDataHash
);

#[derive(Clone, Debug, PartialEq, Eq, scale_codec::Encode, scale_codec::Decode)]
pub struct ExtData {
    /// withdrawal destination (L1 recipient for cross-chain withdrawals)
    pub recipient: Address,
    /// signed public amount: positive deposits, negative withdraws
    pub ext_amount: i128,
    pub relayer: Address,
    pub fee: Amount,
    /// one ciphertext per output note, in output order
    pub encrypted_outputs: Vec<Vec<u8>>,
    /// route the withdrawal through the bridge instead of paying `recipient`
    pub is_cross_chain_withdrawal: bool,
    /// fee the bridge keeps on the far side of a cross-chain withdrawal
    pub l1_fee: Amount,
}

impl ExtData {
    /// H(domain || scale(self))
    pub fn hash(&self) -> ExtDataHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(EXT_DATA_DOMAIN);
        hasher.update(&self.encode());
        ExtDataHash(*hasher.finalize().as_bytes())
    }

    /// value the proof commits to, `ext_amount - fee`
    pub fn public_amount(&self) -> Result<i128> {
        value::public_amount(self.ext_amount, self.fee)
    }

    pub fn is_deposit(&self) -> bool {
        self.ext_amount > 0
    }

    pub fn is_withdrawal(&self) -> bool {
        self.ext_amount < 0
    }

    /// tokens leaving the pool towards the recipient (or the bridge)
    pub fn withdrawal_amount(&self) -> Amount {
        if self.is_withdrawal() {
            Amount::from_signed_abs(self.ext_amount)
        } else {
            Amount::ZERO
        }
    }

    /// tokens the pool must pull in
    pub fn deposit_amount(&self) -> Amount {
        if self.is_deposit() {
            Amount::from_signed_abs(self.ext_amount)
        } else {
            Amount::ZERO
        }
    }
}
