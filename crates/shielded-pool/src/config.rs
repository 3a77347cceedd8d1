//! pool configuration, fixed at initialisation

use serde::{Deserialize, Serialize};
use shielded_merkle::MAX_HEIGHT;

use crate::error::{Error, Result};
use crate::ext_data::Address;
use crate::value::{Amount, MAX_EXT_AMOUNT};

/// who receives the fee of an accepted transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRecipient {
    /// the relayer named in the transaction's ext data
    #[default]
    Relayer,
    /// a fixed treasury account
    Treasury(Address),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// tree holds 2^tree_height commitments
    pub tree_height: usize,
    /// how many recent roots proofs may reference
    pub root_history_size: usize,
    pub minimum_withdrawal_amount: Amount,
    pub maximum_deposit_amount: Amount,
    pub fee_recipient: FeeRecipient,
    /// the pool's token
    pub token: Address,
    /// account holding the pool's tokens
    pub pool_account: Address,
    /// bridge escrow; bridged deposits are credited from it and cross-chain
    /// withdrawals paid into it
    pub bridge_account: Address,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            tree_height: 23,
            root_history_size: 100,
            // 0.05 and 1 in native units
            minimum_withdrawal_amount: Amount(50_000_000_000_000_000),
            maximum_deposit_amount: Amount(1_000_000_000_000_000_000),
            fee_recipient: FeeRecipient::Relayer,
            token: Address::derive("shielded-pool.token"),
            pool_account: Address::derive("shielded-pool.pool"),
            bridge_account: Address::derive("shielded-pool.bridge"),
        }
    }
}

impl PoolConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tree_height == 0 || self.tree_height > MAX_HEIGHT {
            return Err(Error::Config(format!(
                "tree_height must be in 1..={MAX_HEIGHT}, got {}",
                self.tree_height
            )));
        }
        if self.root_history_size == 0 {
            return Err(Error::Config("root_history_size must be positive".into()));
        }
        if self.minimum_withdrawal_amount > self.maximum_deposit_amount {
            return Err(Error::Config(format!(
                "minimum withdrawal {} exceeds maximum deposit {}",
                self.minimum_withdrawal_amount, self.maximum_deposit_amount
            )));
        }
        if self.maximum_deposit_amount.0 >= MAX_EXT_AMOUNT as u128 {
            return Err(Error::Config("maximum_deposit_amount exceeds the protocol bound".into()));
        }
        if self.pool_account == self.bridge_account {
            return Err(Error::Config("pool_account and bridge_account must differ".into()));
        }
        Ok(())
    }

    /// fee destination for a transaction relayed by `relayer`
    pub fn fee_destination(&self, relayer: &Address) -> Address {
        match self.fee_recipient {
            FeeRecipient::Relayer => *relayer,
            FeeRecipient::Treasury(treasury) => treasury,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::default();
        config.validate().unwrap();
        assert_eq!(config.minimum_withdrawal_amount, Amount::parse_units("0.05").unwrap());
        assert_eq!(config.maximum_deposit_amount, Amount::parse_units("1").unwrap());
    }

    #[test]
    fn test_from_toml() {
        let config = PoolConfig::from_toml(
            r#"
            tree_height = 5
            root_history_size = 30
            minimum_withdrawal_amount = "0.05"
            maximum_deposit_amount = "1"
            fee_recipient = { treasury = "0x00000000000000000000000000000000000000ff" }
            "#,
        )
        .unwrap();

        assert_eq!(config.tree_height, 5);
        assert_eq!(config.root_history_size, 30);
        let mut treasury = [0u8; 20];
        treasury[19] = 0xff;
        assert_eq!(config.fee_recipient, FeeRecipient::Treasury(Address(treasury)));
        // unspecified fields fall back to defaults
        assert_eq!(config.pool_account, PoolConfig::default().pool_account);
        assert_eq!(config.fee_destination(&Address::derive("relayer")), Address(treasury));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PoolConfig::default();
        assert_eq!(PoolConfig::from_toml(&config.to_toml().unwrap()).unwrap(), config);
    }

    #[test]
    fn test_validate() {
        let bad = |f: fn(&mut PoolConfig)| {
            let mut c = PoolConfig::default();
            f(&mut c);
            c.validate().is_err()
        };
        assert!(bad(|c| c.tree_height = 0));
        assert!(bad(|c| c.tree_height = 33));
        assert!(bad(|c| c.root_history_size = 0));
        assert!(bad(|c| c.minimum_withdrawal_amount = Amount(c.maximum_deposit_amount.0 + 1)));
        assert!(bad(|c| c.bridge_account = c.pool_account));
        assert!(PoolConfig::from_toml("tree_height = 40").is_err());
        assert!(PoolConfig::from_toml("tree_height = \"x\"").is_err());
    }
}
