//! pool events and submission outcomes

use core::fmt;

use crate::ext_data::Address;
use crate::keys::ShieldedAddress;
use crate::note::Commitment;
use crate::nullifier::Nullifier;
use crate::proof::Root;
use crate::value::Amount;

/// append-only log entries, in the order state changed
#[derive(Clone, Debug, PartialEq, Eq, scale_codec::Encode, scale_codec::Decode)]
pub enum PoolEvent {
    /// an output commitment entered the tree
    NewCommitment {
        commitment: Commitment,
        index: u64,
        encrypted_output: Vec<u8>,
    },
    /// an input note was spent
    NewNullifier { nullifier: Nullifier },
    /// an account published its shielded address
    PublicKeyRegistered { owner: Address, address: ShieldedAddress },
    /// tokens handed to the bridge for delivery on the far side
    CrossChainWithdrawal {
        recipient: Address,
        amount: Amount,
        l1_fee: Amount,
    },
}

/// lifecycle of one submission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    Submitted,
    Verifying,
    Accepted,
    Rejected,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxState::Submitted => "submitted",
            TxState::Verifying => "verifying",
            TxState::Accepted => "accepted",
            TxState::Rejected => "rejected",
        })
    }
}

/// result of an accepted transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_id: u64,
    pub state: TxState,
    /// root after inserting the outputs
    pub root: Root,
    /// tree index of the first output commitment
    pub first_index: u64,
    pub output_count: usize,
}

impl Receipt {
    /// tree indices of the outputs, in output order
    pub fn output_indices(&self) -> impl Iterator<Item = u64> {
        self.first_index..self.first_index + self.output_count as u64
    }
}
