//! notes - the private value records of the pool
//!
//! a note commits to (amount, owner, blinding). the commitment is public
//! once inserted; the opening is shared with the owner out-of-band via the
//! encrypted output published alongside it.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{CryptoRng, RngCore};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};

use crate::error::{Error, Result};
use crate::keys::{Keypair, ShieldedAddress};
use crate::nullifier::Nullifier;
use crate::value::{Amount, MAX_NOTE_AMOUNT};
use crate::{COMMITMENT_DOMAIN, NOTE_ENCRYPTION_DOMAIN};

/// ephemeral_pk(32) || nonce(12)
const HEADER_LEN: usize = 32 + 12;
/// amount(16) || blinding(32)
const PLAINTEXT_LEN: usize = 16 + 32;
/// poly1305 tag
const TAG_LEN: usize = 16;

/// length of an encrypted output
pub const ENCRYPTED_NOTE_LEN: usize = HEADER_LEN + PLAINTEXT_LEN + TAG_LEN;

bytes32!(
    /// commitment randomness
    Blinding
);

impl Blinding {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

bytes32!(
    /// hiding commitment to a note, the tree leaf
    Commitment
);

/// a private value record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub amount: Amount,
    pub owner: ShieldedAddress,
    pub blinding: Blinding,
    /// leaf position, known once the commitment is in the tree
    pub index: Option<u64>,
}

impl Note {
    /// note with fresh blinding
    pub fn new(amount: Amount, owner: ShieldedAddress) -> Self {
        Self::random_with(&mut rand::thread_rng(), amount, owner)
    }

    pub fn random_with<R: RngCore + CryptoRng>(rng: &mut R, amount: Amount, owner: ShieldedAddress) -> Self {
        Self::with_blinding(amount, owner, Blinding::random(rng))
    }

    pub fn with_blinding(amount: Amount, owner: ShieldedAddress, blinding: Blinding) -> Self {
        Self {
            amount,
            owner,
            blinding,
            index: None,
        }
    }

    /// zero-value padding note
    pub fn dummy<R: RngCore + CryptoRng>(rng: &mut R, owner: ShieldedAddress) -> Self {
        Self::random_with(rng, Amount::ZERO, owner)
    }

    pub fn at_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    /// H(domain || amount || owner || blinding)
    pub fn commitment(&self) -> Commitment {
        let mut hasher = blake3::Hasher::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update(&self.amount.to_le_bytes());
        hasher.update(&self.owner.public_key.0);
        hasher.update(&self.blinding.0);
        Commitment(*hasher.finalize().as_bytes())
    }

    /// nullifier at the note's recorded tree index
    pub fn nullifier(&self, keypair: &Keypair) -> Result<Nullifier> {
        let index = self.index.ok_or(Error::UnknownInputCommitment(self.commitment()))?;
        self.nullifier_at(keypair, index)
    }

    pub fn nullifier_at(&self, keypair: &Keypair, index: u64) -> Result<Nullifier> {
        if keypair.public_key() != self.owner.public_key {
            return Err(Error::NotOwned);
        }
        let commitment = self.commitment();
        let signature = keypair.sign(&commitment, index)?;
        Ok(Nullifier::derive(&commitment, index, &signature))
    }

    /// encrypt the opening to the owner's encryption key
    pub fn encrypt(&self) -> Result<Vec<u8>> {
        self.encrypt_with(&mut rand::thread_rng())
    }

    pub fn encrypt_with<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Vec<u8>> {
        let ephemeral = EphemeralSecret::random_from_rng(&mut *rng);
        let epk = X25519Public::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&X25519Public::from(self.owner.encryption_key.0));
        let key = note_key(shared.as_bytes(), epk.as_bytes());

        let mut nonce = [0u8; 12];
        rng.fill_bytes(&mut nonce);

        let mut plaintext = [0u8; PLAINTEXT_LEN];
        plaintext[..16].copy_from_slice(&self.amount.to_le_bytes());
        plaintext[16..].copy_from_slice(&self.blinding.0);

        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| Error::Encryption("invalid key".into()))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| Error::Encryption("seal failed".into()))?;

        let mut out = Vec::with_capacity(ENCRYPTED_NOTE_LEN);
        out.extend_from_slice(epk.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// open an encrypted output addressed to `keypair`
    pub fn decrypt(keypair: &Keypair, ciphertext: &[u8], index: u64) -> Result<Self> {
        if ciphertext.len() != ENCRYPTED_NOTE_LEN {
            return Err(Error::Encryption(format!(
                "expected {ENCRYPTED_NOTE_LEN} bytes, got {}",
                ciphertext.len()
            )));
        }
        let secret = keypair.derive_encryption_key()?;

        let mut epk = [0u8; 32];
        epk.copy_from_slice(&ciphertext[..32]);
        let shared = secret.diffie_hellman(&X25519Public::from(epk));
        let key = note_key(shared.as_bytes(), &epk);

        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| Error::Encryption("invalid key".into()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&ciphertext[32..HEADER_LEN]), &ciphertext[HEADER_LEN..])
            .map_err(|_| Error::Encryption("not addressed to this key".into()))?;

        let mut amount = [0u8; 16];
        amount.copy_from_slice(&plaintext[..16]);
        let amount = Amount(u128::from_le_bytes(amount));
        if amount.0 >= MAX_NOTE_AMOUNT {
            return Err(Error::AmountOutOfRange(format!("decrypted amount {amount}")));
        }
        let mut blinding = [0u8; 32];
        blinding.copy_from_slice(&plaintext[16..]);

        Ok(Self::with_blinding(amount, keypair.address(), Blinding(blinding)).at_index(index))
    }
}

/// symmetric key from the x25519 shared secret and ephemeral pubkey
fn note_key(shared_secret: &[u8], epk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(NOTE_ENCRYPTION_DOMAIN);
    hasher.update(shared_secret);
    hasher.update(epk);
    *hasher.finalize().as_bytes()
}
