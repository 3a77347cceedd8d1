//! amounts and the public (non-shielded) leg of a transaction
//!
//! note amounts are unsigned base units. the public leg is signed:
//! positive pulls tokens into the pool, negative pays them out.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// decimals of the native unit
pub const NATIVE_DECIMALS: u32 = 18;

/// exclusive bound on a single note amount (range check in the circuit)
pub const MAX_NOTE_AMOUNT: u128 = 1 << 120;

/// exclusive bound on |ext_amount|
pub const MAX_EXT_AMOUNT: i128 = 1 << 120;

/// exclusive bound on the relayer fee
pub const MAX_FEE: u128 = 1 << 120;

const UNIT: u128 = 10u128.pow(NATIVE_DECIMALS);

/// amount in base units
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    scale_codec::Encode, scale_codec::Decode,
)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn new(amount: u128) -> Self {
        Self(amount)
    }

    /// parse a decimal amount in native units, e.g. `"0.05"`
    pub fn parse_units(s: &str) -> Result<Self> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(Error::ParseAmount(s.into()));
        }
        if frac.len() > NATIVE_DECIMALS as usize {
            return Err(Error::ParseAmount(format!("{s}: more than {NATIVE_DECIMALS} decimals")));
        }
        let digits = |part: &str| -> Result<u128> {
            if part.is_empty() {
                return Ok(0);
            }
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::ParseAmount(s.into()));
            }
            part.parse::<u128>().map_err(|e| Error::ParseAmount(format!("{s}: {e}")))
        };

        let scale = 10u128.pow(NATIVE_DECIMALS - frac.len() as u32);
        let frac = digits(frac)? * scale;
        digits(whole)?
            .checked_mul(UNIT)
            .and_then(|w| w.checked_add(frac))
            .map(Self)
            .ok_or_else(|| Error::ParseAmount(format!("{s}: overflow")))
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn to_le_bytes(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// signed view, valid for every amount below `MAX_NOTE_AMOUNT`
    pub fn signed(&self) -> Result<i128> {
        i128::try_from(self.0).map_err(|_| Error::AmountOutOfRange(format!("{self} overflows i128")))
    }

    /// magnitude of a signed public amount
    pub fn from_signed_abs(value: i128) -> Self {
        Self(value.unsigned_abs())
    }
}

impl From<u128> for Amount {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(v as u128)
    }
}

impl From<Amount> for u128 {
    fn from(v: Amount) -> Self {
        v.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNIT;
        let frac = self.0 % UNIT;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let frac = format!("{frac:018}");
        write!(f, "{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_units(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_units(&s).map_err(serde::de::Error::custom)
    }
}

/// signed public amount: `sum(outputs) - sum(inputs) + fee`
pub fn ext_amount(inputs: Amount, outputs: Amount, fee: Amount) -> Result<i128> {
    let ext = outputs
        .signed()?
        .checked_sub(inputs.signed()?)
        .and_then(|e| e.checked_add(fee.signed().ok()?))
        .ok_or_else(|| Error::AmountOutOfRange(format!("ext amount for fee {fee} overflows")))?;
    check_ext_amount(ext, fee)?;
    Ok(ext)
}

/// value the proof commits to: `sum(inputs) + public_amount == sum(outputs)`
pub fn public_amount(ext_amount: i128, fee: Amount) -> Result<i128> {
    check_ext_amount(ext_amount, fee)?;
    Ok(ext_amount - fee.0 as i128)
}

fn check_ext_amount(ext_amount: i128, fee: Amount) -> Result<()> {
    if fee.0 >= MAX_FEE {
        return Err(Error::AmountOutOfRange(format!("fee {fee} exceeds the protocol maximum")));
    }
    if ext_amount <= -MAX_EXT_AMOUNT || ext_amount >= MAX_EXT_AMOUNT {
        return Err(Error::AmountOutOfRange(format!("ext amount {ext_amount} exceeds the protocol maximum")));
    }
    Ok(())
}
