//! reference proving backend
//!
//! checks every constraint the transaction circuit enforces directly on
//! the witness, then attests to the public inputs with a keyed hash. the
//! attestation is only as trustworthy as the key; it stands in for a real
//! snark where prover and verifier share an operator.

use scale_codec::Encode;
use tracing::debug;

use crate::error::{Error, Result};
use crate::proof::{CircuitVariant, ProofVerifier, Prover, PublicInputs, Witness, ZkProof};
use crate::value::MAX_NOTE_AMOUNT;

/// constraint-checking prover and matching verifier
#[derive(Clone)]
pub struct ReferenceBackend {
    key: [u8; 32],
}

impl ReferenceBackend {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// backend with a key derived from a label
    pub fn from_label(label: &str) -> Self {
        Self::new(blake3::derive_key("shielded-pool.reference-backend.v1", label.as_bytes()))
    }

    fn attest(&self, variant: CircuitVariant, public: &PublicInputs) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(&[variant.tag()]);
        hasher.update(&public.encode());
        *hasher.finalize().as_bytes()
    }

    fn check(witness: &Witness) -> Result<()> {
        let variant = witness.variant;
        let public = &witness.public;
        let fail = |msg: String| Err(Error::InvalidProof(msg));

        if witness.inputs.len() != variant.inputs() || public.input_nullifiers.len() != variant.inputs() {
            return fail(format!("{variant:?} takes {} inputs", variant.inputs()));
        }
        if witness.outputs.len() != variant.outputs() || public.output_commitments.len() != variant.outputs() {
            return fail(format!("{variant:?} takes {} outputs", variant.outputs()));
        }

        let mut sum_in: i128 = 0;
        for (i, input) in witness.inputs.iter().enumerate() {
            let note = &input.note;
            if note.amount.0 >= MAX_NOTE_AMOUNT {
                return fail(format!("input {i} amount out of range"));
            }
            if input.private_key.public_key() != note.owner.public_key {
                return fail(format!("input {i} not owned by the witness key"));
            }

            let commitment = note.commitment();
            let index = input.path.index;
            let signature = input.private_key.sign(&commitment, index);
            let nullifier = crate::nullifier::Nullifier::derive(&commitment, index, &signature);
            if nullifier != public.input_nullifiers[i] {
                return fail(format!("input {i} nullifier mismatch"));
            }

            // zero-value inputs are padding and need not be in the tree
            if !note.amount.is_zero() && !input.path.verify(&commitment.0, &public.root.0) {
                return fail(format!("input {i} not in tree at root {}", public.root));
            }
            sum_in += note.amount.0 as i128;
        }

        for (i, a) in public.input_nullifiers.iter().enumerate() {
            if public.input_nullifiers[..i].contains(a) {
                return fail(format!("duplicate nullifier {a}"));
            }
        }

        let mut sum_out: i128 = 0;
        for (i, note) in witness.outputs.iter().enumerate() {
            if note.amount.0 >= MAX_NOTE_AMOUNT {
                return fail(format!("output {i} amount out of range"));
            }
            if note.commitment() != public.output_commitments[i] {
                return fail(format!("output {i} commitment mismatch"));
            }
            sum_out += note.amount.0 as i128;
        }

        if sum_in + public.public_amount != sum_out {
            return fail(format!(
                "value not conserved: in {sum_in} + public {} != out {sum_out}",
                public.public_amount
            ));
        }
        Ok(())
    }
}

impl core::fmt::Debug for ReferenceBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ReferenceBackend(..)")
    }
}

impl Prover for ReferenceBackend {
    fn prove(&self, witness: &Witness) -> Result<ZkProof> {
        Self::check(witness)?;
        debug!(variant = ?witness.variant, root = %witness.public.root, "witness satisfies constraints");
        Ok(ZkProof(self.attest(witness.variant, &witness.public).to_vec()))
    }
}

impl ProofVerifier for ReferenceBackend {
    fn verify(&self, variant: CircuitVariant, proof: &ZkProof, public: &PublicInputs) -> bool {
        if public.input_nullifiers.len() != variant.inputs() || public.output_commitments.len() != variant.outputs() {
            return false;
        }
        let Ok(attestation) = <[u8; 32]>::try_from(proof.0.as_slice()) else {
            return false;
        };
        // blake3::Hash compares in constant time
        blake3::Hash::from(attestation) == blake3::Hash::from(self.attest(variant, public))
    }
}
