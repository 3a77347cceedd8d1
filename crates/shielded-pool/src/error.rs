//! error types for the shielded pool
//!
//! every error is terminal for the submission that produced it: a rejected
//! transaction is rebuilt against fresh state, never retried as-is.

use shielded_merkle::TreeError;
use thiserror::Error;

use crate::ext_data::Address;
use crate::note::Commitment;
use crate::nullifier::Nullifier;
use crate::value::Amount;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // === pool rejections ===
    #[error("unknown merkle root")]
    UnknownRoot,

    #[error("nullifier already spent: {0}")]
    NullifierAlreadySpent(Nullifier),

    #[error("amount out of range: {0}")]
    AmountOutOfRange(String),

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("insufficient deposit: required {required}, available {available}")]
    InsufficientDeposit { required: Amount, available: Amount },

    #[error("can't withdraw to the zero address")]
    MissingRecipient,

    #[error("merkle tree is full: capacity {capacity}, requested {requested}")]
    TreeFull { capacity: u64, requested: u64 },

    // === builder ===
    #[error("note is not owned by this keypair")]
    NotOwned,

    #[error("private key unavailable for input {0}")]
    UnownedInput(usize),

    #[error("too many inputs: {got}, largest circuit takes {max}")]
    TooManyInputs { got: usize, max: usize },

    #[error("too many outputs: {got}, largest circuit takes {max}")]
    TooManyOutputs { got: usize, max: usize },

    #[error("input commitment not found in tree: {0}")]
    UnknownInputCommitment(Commitment),

    // === bridge ===
    #[error("bridged amount {bridged} does not match public amount {ext_amount}")]
    BridgeAmountMismatch { bridged: Amount, ext_amount: i128 },

    #[error("unsupported token {0}")]
    UnsupportedToken(Address),

    // === token ledger ===
    #[error("insufficient balance on {account}: have {balance}, need {required}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        required: Amount,
    },

    // === plumbing ===
    #[error("merkle tree error: {0}")]
    Tree(#[source] TreeError),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid amount: {0}")]
    ParseAmount(String),
}

impl From<TreeError> for Error {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::TreeFull { capacity, requested } => Error::TreeFull { capacity, requested },
            other => Error::Tree(other),
        }
    }
}

impl From<scale_codec::Error> for Error {
    fn from(e: scale_codec::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
