//! authoritative pool state
//!
//! tree, nullifier set, token balance and event log live in one struct so
//! that a single lock guards all of them. `apply` either commits a whole
//! transaction or leaves every field as it found it.

use std::collections::HashMap;

use shielded_merkle::MerkleTree;
use tracing::{debug, error};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::ext_data::{Address, ExtData};
use crate::keys::ShieldedAddress;
use crate::nullifier::NullifierSet;
use crate::pool::events::PoolEvent;
use crate::proof::{Proof, Root};
use crate::token::TokenLedger;
use crate::value::Amount;

/// where the public leg of a deposit comes from
#[derive(Clone, Copy, Debug)]
pub(crate) enum Funding<'a> {
    /// pulled from the submitting account during settlement
    Caller(&'a Address),
    /// already credited to the pool by the bridge adapter
    Bridged,
}

/// outcome of a committed transaction
#[derive(Clone, Copy, Debug)]
pub(crate) struct Applied {
    pub root: Root,
    pub first_index: u64,
}

pub(crate) struct PoolState<T> {
    pub(crate) tree: MerkleTree,
    pub(crate) nullifiers: NullifierSet,
    pub(crate) token: T,
    pub(crate) events: Vec<PoolEvent>,
    pub(crate) registry: HashMap<Address, ShieldedAddress>,
    /// pool balance after the last accepted transaction
    pub(crate) last_balance: Amount,
}

impl<T: TokenLedger> PoolState<T> {
    pub(crate) fn new(config: &PoolConfig, token: T) -> Result<Self> {
        let last_balance = token.balance_of(&config.pool_account);
        Ok(Self {
            tree: MerkleTree::new(config.tree_height, config.root_history_size)?,
            nullifiers: NullifierSet::new(),
            token,
            events: Vec::new(),
            registry: HashMap::new(),
            last_balance,
        })
    }

    /// checks that depend on state; cheap enough to run under either lock
    pub(crate) fn check(&self, proof: &Proof) -> Result<()> {
        if !self.tree.is_known_root(&proof.root.0) {
            return Err(Error::UnknownRoot);
        }
        if let Some(nf) = self.nullifiers.first_spent(&proof.input_nullifiers) {
            return Err(Error::NullifierAlreadySpent(nf));
        }
        Ok(())
    }

    /// re-check, settle tokens, then insert commitments and nullifiers
    pub(crate) fn apply(
        &mut self,
        config: &PoolConfig,
        proof: &Proof,
        ext: &ExtData,
        funding: Funding<'_>,
    ) -> Result<Applied> {
        self.check(proof)?;

        let requested = proof.output_commitments.len() as u64;
        if self.tree.len() + requested > self.tree.capacity() {
            return Err(Error::TreeFull {
                capacity: self.tree.capacity(),
                requested,
            });
        }

        let journal = self.settle(config, ext, funding)?;

        let first_index = self.tree.len();
        let leaves: Vec<_> = proof.output_commitments.iter().map(|c| c.0).collect();
        let root = match self.tree.insert(&leaves) {
            Ok(root) => Root(root),
            Err(e) => {
                self.rollback(journal);
                return Err(e.into());
            }
        };

        for nf in &proof.input_nullifiers {
            self.nullifiers.insert(*nf);
        }
        for (i, (commitment, encrypted_output)) in proof
            .output_commitments
            .iter()
            .zip(&ext.encrypted_outputs)
            .enumerate()
        {
            self.events.push(PoolEvent::NewCommitment {
                commitment: *commitment,
                index: first_index + i as u64,
                encrypted_output: encrypted_output.clone(),
            });
        }
        for nf in &proof.input_nullifiers {
            self.events.push(PoolEvent::NewNullifier { nullifier: *nf });
        }
        if ext.is_withdrawal() && ext.is_cross_chain_withdrawal {
            self.events.push(PoolEvent::CrossChainWithdrawal {
                recipient: ext.recipient,
                amount: ext.withdrawal_amount(),
                l1_fee: ext.l1_fee,
            });
        }

        self.last_balance = self.token.balance_of(&config.pool_account);
        debug!(%root, first_index, pool_balance = %self.last_balance, "state committed");
        Ok(Applied { root, first_index })
    }

    /// move the public leg; on failure every completed transfer is reversed
    fn settle(&mut self, config: &PoolConfig, ext: &ExtData, funding: Funding<'_>) -> Result<Vec<Transfer>> {
        let pool = config.pool_account;
        let mut journal = Vec::new();

        if ext.is_deposit() {
            let required = ext.deposit_amount();
            match funding {
                Funding::Caller(sender) => {
                    let available = self.token.balance_of(sender);
                    if available < required {
                        return Err(Error::InsufficientDeposit { required, available });
                    }
                    self.transfer(&mut journal, *sender, pool, required)?;
                }
                Funding::Bridged => {
                    let balance = self.token.balance_of(&pool);
                    let available = balance.checked_sub(self.last_balance).unwrap_or(Amount::ZERO);
                    if available < required {
                        return Err(Error::InsufficientDeposit { required, available });
                    }
                }
            }
        }

        if ext.is_withdrawal() {
            let to = if ext.is_cross_chain_withdrawal {
                config.bridge_account
            } else {
                ext.recipient
            };
            if let Err(e) = self.transfer(&mut journal, pool, to, ext.withdrawal_amount()) {
                self.rollback(journal);
                return Err(e);
            }
        }

        if !ext.fee.is_zero() {
            let to = config.fee_destination(&ext.relayer);
            if let Err(e) = self.transfer(&mut journal, pool, to, ext.fee) {
                self.rollback(journal);
                return Err(e);
            }
        }

        Ok(journal)
    }

    fn transfer(&mut self, journal: &mut Vec<Transfer>, from: Address, to: Address, amount: Amount) -> Result<()> {
        self.token.transfer(&from, &to, amount)?;
        journal.push(Transfer { from, to, amount });
        Ok(())
    }

    fn rollback(&mut self, journal: Vec<Transfer>) {
        for t in journal.into_iter().rev() {
            if let Err(e) = self.token.transfer(&t.to, &t.from, t.amount) {
                error!(from = %t.to, to = %t.from, amount = %t.amount, "rollback transfer failed: {e}");
            }
        }
    }
}

struct Transfer {
    from: Address,
    to: Address,
    amount: Amount,
}
