//! proof bundle and the prover/verifier capability
//!
//! the circuit is external. the pool only fixes the public-input schema:
//! root, input nullifiers, output commitments, public amount and the ext
//! data hash, at the fixed arity of the circuit variant that produced it.

use scale_codec::{Decode, Encode, Input, Output};
use shielded_merkle::MerklePath;

use crate::error::{Error, Result};
use crate::keys::PrivateKey;
use crate::note::{Commitment, Note};
use crate::nullifier::Nullifier;
use crate::ext_data::ExtDataHash;

bytes32!(
    /// merkle root a proof was built against
    Root
);

impl From<shielded_merkle::Hash> for Root {
    fn from(hash: shielded_merkle::Hash) -> Self {
        Self(hash)
    }
}

/// circuit variants by (inputs, outputs) arity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub enum CircuitVariant {
    #[codec(index = 2)]
    Tx2,
    #[codec(index = 16)]
    Tx16,
}

impl CircuitVariant {
    pub const ALL: [CircuitVariant; 2] = [CircuitVariant::Tx2, CircuitVariant::Tx16];

    pub fn inputs(&self) -> usize {
        match self {
            CircuitVariant::Tx2 => 2,
            CircuitVariant::Tx16 => 16,
        }
    }

    pub fn outputs(&self) -> usize {
        match self {
            CircuitVariant::Tx2 => 2,
            CircuitVariant::Tx16 => 16,
        }
    }

    /// smallest variant that fits both counts
    pub fn for_counts(inputs: usize, outputs: usize) -> Result<Self> {
        let largest = CircuitVariant::Tx16;
        if inputs > largest.inputs() {
            return Err(Error::TooManyInputs { got: inputs, max: largest.inputs() });
        }
        if outputs > largest.outputs() {
            return Err(Error::TooManyOutputs { got: outputs, max: largest.outputs() });
        }
        Ok(Self::ALL
            .into_iter()
            .find(|v| inputs <= v.inputs() && outputs <= v.outputs())
            .unwrap_or(largest))
    }

    /// wire tag, also the verification key selector
    pub fn tag(&self) -> u8 {
        match self {
            CircuitVariant::Tx2 => 2,
            CircuitVariant::Tx16 => 16,
        }
    }
}

/// public inputs of the circuit
#[derive(Clone, Debug, PartialEq, Eq, Encode)]
pub struct PublicInputs {
    pub root: Root,
    pub input_nullifiers: Vec<Nullifier>,
    pub output_commitments: Vec<Commitment>,
    /// `ext_amount - fee`
    pub public_amount: i128,
    pub ext_data_hash: ExtDataHash,
}

/// opaque proof bytes
#[derive(Clone, Debug, PartialEq, Eq, Default, Encode, Decode)]
pub struct ZkProof(pub Vec<u8>);

/// what gets submitted to the pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    pub variant: CircuitVariant,
    pub proof: ZkProof,
    pub root: Root,
    pub input_nullifiers: Vec<Nullifier>,
    pub output_commitments: Vec<Commitment>,
    pub public_amount: i128,
    pub ext_data_hash: ExtDataHash,
}

impl Proof {
    pub fn new(variant: CircuitVariant, proof: ZkProof, public: PublicInputs) -> Self {
        Self {
            variant,
            proof,
            root: public.root,
            input_nullifiers: public.input_nullifiers,
            output_commitments: public.output_commitments,
            public_amount: public.public_amount,
            ext_data_hash: public.ext_data_hash,
        }
    }

    /// nullifier and commitment counts must match the variant exactly
    pub fn check_arity(&self) -> Result<()> {
        if self.input_nullifiers.len() != self.variant.inputs() {
            return Err(Error::InvalidProof(format!(
                "{:?} expects {} nullifiers, got {}",
                self.variant,
                self.variant.inputs(),
                self.input_nullifiers.len()
            )));
        }
        if self.output_commitments.len() != self.variant.outputs() {
            return Err(Error::InvalidProof(format!(
                "{:?} expects {} commitments, got {}",
                self.variant,
                self.variant.outputs(),
                self.output_commitments.len()
            )));
        }
        Ok(())
    }

    pub fn public_inputs(&self) -> PublicInputs {
        PublicInputs {
            root: self.root,
            input_nullifiers: self.input_nullifiers.clone(),
            output_commitments: self.output_commitments.clone(),
            public_amount: self.public_amount,
            ext_data_hash: self.ext_data_hash,
        }
    }
}

// wire layout: variant tag, proof bytes, root, then nullifiers and
// commitments without length prefixes (the tag fixes their count)
impl Encode for Proof {
    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        self.variant.encode_to(dest);
        self.proof.encode_to(dest);
        self.root.encode_to(dest);
        for nf in &self.input_nullifiers {
            nf.encode_to(dest);
        }
        for cm in &self.output_commitments {
            cm.encode_to(dest);
        }
        self.public_amount.encode_to(dest);
        self.ext_data_hash.encode_to(dest);
    }
}

impl Decode for Proof {
    fn decode<I: Input>(input: &mut I) -> core::result::Result<Self, scale_codec::Error> {
        let variant = CircuitVariant::decode(input)?;
        let proof = ZkProof::decode(input)?;
        let root = Root::decode(input)?;
        let input_nullifiers = (0..variant.inputs())
            .map(|_| Nullifier::decode(input))
            .collect::<core::result::Result<Vec<_>, _>>()?;
        let output_commitments = (0..variant.outputs())
            .map(|_| Commitment::decode(input))
            .collect::<core::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            variant,
            proof,
            root,
            input_nullifiers,
            output_commitments,
            public_amount: i128::decode(input)?,
            ext_data_hash: ExtDataHash::decode(input)?,
        })
    }
}

/// private opening of one input
#[derive(Clone, Debug)]
pub struct InputWitness {
    pub note: Note,
    pub private_key: PrivateKey,
    /// path.index is the leaf position the nullifier is bound to
    pub path: MerklePath,
}

/// everything the prover needs
#[derive(Clone, Debug)]
pub struct Witness {
    pub variant: CircuitVariant,
    pub public: PublicInputs,
    pub inputs: Vec<InputWitness>,
    pub outputs: Vec<Note>,
}

/// proving capability, usually a remote or expensive service
pub trait Prover {
    fn prove(&self, witness: &Witness) -> Result<ZkProof>;
}

/// verification capability used by the pool
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, variant: CircuitVariant, proof: &ZkProof, public: &PublicInputs) -> bool;
}

impl<V: ProofVerifier + ?Sized> ProofVerifier for std::sync::Arc<V> {
    fn verify(&self, variant: CircuitVariant, proof: &ZkProof, public: &PublicInputs) -> bool {
        (**self).verify(variant, proof, public)
    }
}
