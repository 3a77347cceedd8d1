//! fungible token boundary
//!
//! the pool settles its public leg through this trait. transfer mechanics
//! live outside the pool; `InMemoryToken` is the ledger used by tests and
//! local setups.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ext_data::Address;
use crate::value::Amount;

pub trait TokenLedger: Send + Sync {
    /// token this ledger tracks
    fn token(&self) -> Address;

    fn balance_of(&self, account: &Address) -> Amount;

    /// move `amount` or fail without effect
    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()>;
}

/// balances in a hashmap
#[derive(Clone, Debug)]
pub struct InMemoryToken {
    token: Address,
    balances: HashMap<Address, Amount>,
}

impl InMemoryToken {
    pub fn new(token: Address) -> Self {
        Self {
            token,
            balances: HashMap::new(),
        }
    }

    /// credit new supply to `account`
    pub fn mint(&mut self, account: &Address, amount: Amount) {
        let balance = self.balances.entry(*account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn total_supply(&self) -> Amount {
        self.balances.values().fold(Amount::ZERO, |acc, b| acc.saturating_add(*b))
    }
}

impl TokenLedger for InMemoryToken {
    fn token(&self) -> Address {
        self.token
    }

    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        if amount.is_zero() || from == to {
            return Ok(());
        }
        let balance = self.balance_of(from);
        let remaining = balance.checked_sub(amount).ok_or(Error::InsufficientBalance {
            account: *from,
            balance,
            required: amount,
        })?;
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| Error::AmountOutOfRange(format!("balance of {to} overflows")))?;

        self.balances.insert(*from, remaining);
        self.balances.insert(*to, credited);
        Ok(())
    }
}
