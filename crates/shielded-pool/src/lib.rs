//! shielded utxo pool with bridged deposits
//!
//! private notes hide amount, owner and linkage behind commitments; spends
//! are authorised by zero-knowledge proofs over a commitment tree and
//! reveal only nullifiers.
//!
//! # architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SHIELDED POOL                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  client                                                     │
//! │  ├─ keypair / notes (commitment, nullifier, encryption)     │
//! │  ├─ transaction builder  → witness + ext data               │
//! │  └─ prover (opaque)      → proof                            │
//! │                                                             │
//! │  pool (single writer)                                       │
//! │  ├─ commitment tree + root history                          │
//! │  ├─ nullifier set                                           │
//! │  ├─ token balance (public leg settlement)                   │
//! │  └─ events (commitments, nullifiers, bridge withdrawals)    │
//! │                                                             │
//! │  bridge adapter                                             │
//! │  └─ locked transfer + encoded proof → one atomic deposit    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

/// 32-byte value types shared across the pool
macro_rules! bytes32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, scale_codec::Encode, scale_codec::Decode)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn to_bytes(&self) -> [u8; 32] {
                self.0
            }

            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({}..)", stringify!($name), hex::encode(&self.0[..6]))
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

pub mod backend;
pub mod bridge;
pub mod builder;
pub mod config;
pub mod error;
pub mod ext_data;
pub mod keys;
pub mod note;
pub mod nullifier;
pub mod pool;
pub mod proof;
pub mod token;
pub mod value;

pub use backend::ReferenceBackend;
pub use bridge::{decode_payload, encode_payload, BridgeAdapter, WithdrawalRequest};
pub use builder::{OwnedNote, PreparedTransaction, TransactionBuilder, TransactionRequest};
pub use config::{FeeRecipient, PoolConfig};
pub use error::{Error, Result};
pub use ext_data::{Address, ExtData, ExtDataHash};
pub use keys::{Keypair, PublicKey, ShieldedAddress};
pub use note::{Blinding, Commitment, Note};
pub use nullifier::{Nullifier, NullifierSet};
pub use pool::{PoolEvent, Receipt, ShieldedPool, TxState};
pub use proof::{CircuitVariant, Proof, ProofVerifier, Prover, PublicInputs, Root, Witness, ZkProof};
pub use token::{InMemoryToken, TokenLedger};
pub use value::Amount;

/// domain separator for public key derivation
pub const PUBLIC_KEY_DOMAIN: &[u8] = b"shielded-pool.public-key.v1";
/// domain separator for the nullifier signature
pub const SIGNATURE_DOMAIN: &[u8] = b"shielded-pool.signature.v1";
/// domain separator for note commitments
pub const COMMITMENT_DOMAIN: &[u8] = b"shielded-pool.commitment.v1";
/// domain separator for nullifiers
pub const NULLIFIER_DOMAIN: &[u8] = b"shielded-pool.nullifier.v1";
/// domain separator for the ext data binding
pub const EXT_DATA_DOMAIN: &[u8] = b"shielded-pool.ext-data.v1";
/// domain separator for the note encryption secret
pub const ENCRYPTION_KEY_DOMAIN: &[u8] = b"shielded-pool.encryption-key.v1";
/// domain separator for per-note symmetric keys
pub const NOTE_ENCRYPTION_DOMAIN: &[u8] = b"shielded-pool.note-encryption.v1";
