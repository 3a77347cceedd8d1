//! shielded account keys
//!
//! a keypair is a 32-byte private key with two one-way derivations: the
//! public key that owns notes, and an x25519 secret used to receive
//! encrypted note openings. keys are hashed with blake3 under separate
//! domain tags.

use rand::{CryptoRng, RngCore};
use x25519_dalek::StaticSecret;

use crate::error::{Error, Result};
use crate::note::{Commitment, Note};
use crate::pool::PoolEvent;
use crate::{ENCRYPTION_KEY_DOMAIN, PUBLIC_KEY_DOMAIN, SIGNATURE_DOMAIN};

/// private spending key
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(PUBLIC_KEY_DOMAIN);
        hasher.update(&self.0);
        PublicKey(*hasher.finalize().as_bytes())
    }

    /// signature over (commitment, index), only ever fed into a nullifier
    /// sig = H(domain || sk || commitment || index)
    pub(crate) fn sign(&self, commitment: &Commitment, index: u64) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SIGNATURE_DOMAIN);
        hasher.update(&self.0);
        hasher.update(&commitment.0);
        hasher.update(&index.to_le_bytes());
        *hasher.finalize().as_bytes()
    }

    fn encryption_secret(&self) -> StaticSecret {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ENCRYPTION_KEY_DOMAIN);
        hasher.update(&self.0);
        StaticSecret::from(*hasher.finalize().as_bytes())
    }
}

impl core::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

bytes32!(
    /// note owner key, shareable
    PublicKey
);

bytes32!(
    /// x25519 public key that output notes are encrypted to
    EncryptionPublicKey
);

/// everything a sender needs to pay an account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, scale_codec::Encode, scale_codec::Decode)]
pub struct ShieldedAddress {
    pub public_key: PublicKey,
    pub encryption_key: EncryptionPublicKey,
}

/// shielded account
///
/// a keypair built from an address alone is watch-only: it can be paid but
/// cannot spend, decrypt or derive nullifiers.
#[derive(Clone, Debug)]
pub struct Keypair {
    private_key: Option<PrivateKey>,
    public_key: PublicKey,
    encryption_key: EncryptionPublicKey,
}

impl Keypair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_private_key(PrivateKey::random(rng))
    }

    /// fresh keypair from the thread rng
    pub fn random() -> Self {
        Self::generate(&mut rand::thread_rng())
    }

    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        let secret = private_key.encryption_secret();
        let encryption_key = EncryptionPublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes());
        Self {
            private_key: Some(private_key),
            public_key,
            encryption_key,
        }
    }

    /// watch-only keypair for someone else's address
    pub fn from_address(address: ShieldedAddress) -> Self {
        Self {
            private_key: None,
            public_key: address.public_key,
            encryption_key: address.encryption_key,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn address(&self) -> ShieldedAddress {
        ShieldedAddress {
            public_key: self.public_key,
            encryption_key: self.encryption_key,
        }
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    /// true if this keypair can spend notes owned by `public_key`
    pub fn owns(&self, public_key: &PublicKey) -> bool {
        self.private_key.is_some() && self.public_key == *public_key
    }

    pub(crate) fn sign(&self, commitment: &Commitment, index: u64) -> Result<[u8; 32]> {
        self.private_key
            .as_ref()
            .map(|sk| sk.sign(commitment, index))
            .ok_or(Error::NotOwned)
    }

    /// x25519 secret for decrypting notes sent to this account
    pub fn derive_encryption_key(&self) -> Result<StaticSecret> {
        self.private_key
            .as_ref()
            .map(PrivateKey::encryption_secret)
            .ok_or(Error::NotOwned)
    }

    /// walk the pool's event log and return the notes this account can
    /// decrypt, whose commitment matches the event, and whose nullifiers
    /// have not been published
    pub fn scan<'a>(&self, events: impl IntoIterator<Item = &'a PoolEvent>) -> Vec<Note> {
        if !self.has_private_key() {
            return Vec::new();
        }

        let mut notes = Vec::new();
        let mut spent = std::collections::HashSet::new();
        for event in events {
            match event {
                PoolEvent::NewCommitment { commitment, index, encrypted_output } => {
                    // the ciphertext is unchecked by the pool; only keep what the tree holds
                    match Note::decrypt(self, encrypted_output, *index) {
                        Ok(note) if note.commitment() == *commitment => notes.push(note),
                        _ => {}
                    }
                }
                PoolEvent::NewNullifier { nullifier } => {
                    spent.insert(*nullifier);
                }
                _ => {}
            }
        }

        notes.retain(|note| {
            // a note only decrypts to us if we own it, so the nullifier is derivable
            note.nullifier(self)
                .map(|nf| !spent.contains(&nf))
                .unwrap_or(false)
        });
        notes
    }
}
