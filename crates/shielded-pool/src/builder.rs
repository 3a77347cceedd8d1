//! transaction builder
//!
//! turns "spend these notes, create those" into a witness for the prover
//! and the ext data the pool will settle. all local validation happens
//! here so a bad request fails before any proving cost.

use rand::{CryptoRng, RngCore};
use shielded_merkle::{MerklePath, MerkleTree};
use tracing::{debug, instrument};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::ext_data::{Address, ExtData};
use crate::keys::Keypair;
use crate::note::Note;
use crate::proof::{CircuitVariant, InputWitness, Proof, Prover, PublicInputs, Root, Witness};
use crate::value::{self, Amount, MAX_NOTE_AMOUNT};

/// input note with the keypair able to spend it
#[derive(Clone, Debug)]
pub struct OwnedNote {
    pub note: Note,
    pub keypair: Keypair,
}

impl OwnedNote {
    pub fn new(note: Note, keypair: Keypair) -> Self {
        Self { note, keypair }
    }
}

/// what the caller wants to do
#[derive(Clone, Debug, Default)]
pub struct TransactionRequest {
    pub inputs: Vec<OwnedNote>,
    pub outputs: Vec<Note>,
    /// withdrawal destination, required when value leaves the pool
    pub recipient: Address,
    pub relayer: Address,
    pub fee: Amount,
    pub l1_fee: Amount,
    pub is_cross_chain_withdrawal: bool,
}

impl TransactionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, note: Note, keypair: Keypair) -> Self {
        self.inputs.push(OwnedNote::new(note, keypair));
        self
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = OwnedNote>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_output(mut self, note: Note) -> Self {
        self.outputs.push(note);
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = Note>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = recipient;
        self
    }

    pub fn with_relayer(mut self, relayer: Address) -> Self {
        self.relayer = relayer;
        self
    }

    pub fn with_fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    /// withdraw through the bridge, paying `l1_fee` on the far side
    pub fn cross_chain_withdrawal(mut self, l1_fee: Amount) -> Self {
        self.is_cross_chain_withdrawal = true;
        self.l1_fee = l1_fee;
        self
    }
}

/// witness plus ext data, ready for the prover
#[derive(Clone, Debug)]
pub struct PreparedTransaction {
    pub witness: Witness,
    pub ext_data: ExtData,
}

impl PreparedTransaction {
    pub fn variant(&self) -> CircuitVariant {
        self.witness.variant
    }

    pub fn public_inputs(&self) -> &PublicInputs {
        &self.witness.public
    }

    /// padded outputs in tree order
    pub fn outputs(&self) -> &[Note] {
        &self.witness.outputs
    }

    pub fn prove<P: Prover + ?Sized>(self, prover: &P) -> Result<(Proof, ExtData)> {
        let zk = prover.prove(&self.witness)?;
        Ok((Proof::new(self.witness.variant, zk, self.witness.public), self.ext_data))
    }
}

/// assembles transactions under the pool's amount bounds
#[derive(Clone, Debug)]
pub struct TransactionBuilder {
    minimum_withdrawal: Amount,
    maximum_deposit: Amount,
}

impl TransactionBuilder {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            minimum_withdrawal: config.minimum_withdrawal_amount,
            maximum_deposit: config.maximum_deposit_amount,
        }
    }

    /// prepare against the current root of `tree`
    pub fn prepare(&self, tree: &MerkleTree, request: TransactionRequest) -> Result<PreparedTransaction> {
        self.prepare_with_rng(tree, request, &mut rand::thread_rng())
    }

    #[instrument(skip_all, fields(inputs = request.inputs.len(), outputs = request.outputs.len()))]
    pub fn prepare_with_rng<R: RngCore + CryptoRng>(
        &self,
        tree: &MerkleTree,
        request: TransactionRequest,
        rng: &mut R,
    ) -> Result<PreparedTransaction> {
        let variant = CircuitVariant::for_counts(request.inputs.len(), request.outputs.len())?;

        for (i, input) in request.inputs.iter().enumerate() {
            if !input.keypair.owns(&input.note.owner.public_key) {
                return Err(Error::UnownedInput(i));
            }
        }

        let sum_in = sum(request.inputs.iter().map(|i| &i.note))?;
        let sum_out = sum(request.outputs.iter())?;
        let ext_amount = value::ext_amount(sum_in, sum_out, request.fee)?;
        self.check_bounds(ext_amount)?;
        if ext_amount < 0 && request.recipient.is_zero() {
            return Err(Error::MissingRecipient);
        }

        // pad to the circuit's arity with zero notes of a throwaway key
        let dummy = Keypair::generate(rng);
        let mut inputs = Vec::with_capacity(variant.inputs());
        for input in &request.inputs {
            inputs.push((input.note.clone(), input.keypair.clone(), Some(locate(tree, &input.note)?)));
        }
        while inputs.len() < variant.inputs() {
            inputs.push((Note::dummy(rng, dummy.address()), dummy.clone(), None));
        }
        let mut outputs = request.outputs;
        while outputs.len() < variant.outputs() {
            outputs.push(Note::dummy(rng, dummy.address()));
        }

        let mut input_nullifiers = Vec::with_capacity(inputs.len());
        let mut input_witnesses = Vec::with_capacity(inputs.len());
        for (i, (note, keypair, path)) in inputs.into_iter().enumerate() {
            let path = path.unwrap_or_else(|| MerklePath {
                index: 0,
                siblings: vec![[0u8; 32]; tree.height()],
            });
            input_nullifiers.push(note.nullifier_at(&keypair, path.index)?);
            let private_key = keypair.private_key().cloned().ok_or(Error::UnownedInput(i))?;
            input_witnesses.push(InputWitness { note, private_key, path });
        }

        let output_commitments = outputs.iter().map(Note::commitment).collect();
        let encrypted_outputs = outputs
            .iter()
            .map(|note| note.encrypt_with(&mut *rng))
            .collect::<Result<Vec<_>>>()?;

        let ext_data = ExtData {
            recipient: request.recipient,
            ext_amount,
            relayer: request.relayer,
            fee: request.fee,
            encrypted_outputs,
            is_cross_chain_withdrawal: request.is_cross_chain_withdrawal,
            l1_fee: request.l1_fee,
        };

        let public = PublicInputs {
            root: Root(tree.root()),
            input_nullifiers,
            output_commitments,
            public_amount: ext_data.public_amount()?,
            ext_data_hash: ext_data.hash(),
        };
        debug!(?variant, ext_amount, root = %public.root, "prepared transaction");

        Ok(PreparedTransaction {
            witness: Witness {
                variant,
                public,
                inputs: input_witnesses,
                outputs,
            },
            ext_data,
        })
    }

    fn check_bounds(&self, ext_amount: i128) -> Result<()> {
        let magnitude = Amount::from_signed_abs(ext_amount);
        if ext_amount > 0 && magnitude > self.maximum_deposit {
            return Err(Error::AmountOutOfRange(format!(
                "deposit {magnitude} above maximum {}",
                self.maximum_deposit
            )));
        }
        if ext_amount < 0 && magnitude < self.minimum_withdrawal {
            return Err(Error::AmountOutOfRange(format!(
                "withdrawal {magnitude} below minimum {}",
                self.minimum_withdrawal
            )));
        }
        Ok(())
    }
}

fn sum<'a>(mut notes: impl Iterator<Item = &'a Note>) -> Result<Amount> {
    notes.try_fold(Amount::ZERO, |acc, note| {
        if note.amount.0 >= MAX_NOTE_AMOUNT {
            return Err(Error::AmountOutOfRange(format!("note amount {}", note.amount)));
        }
        acc.checked_add(note.amount)
            .ok_or_else(|| Error::AmountOutOfRange("note amounts overflow".into()))
    })
}

/// inclusion path of an input, trusting `note.index` only if the leaf matches
fn locate(tree: &MerkleTree, note: &Note) -> Result<MerklePath> {
    let commitment = note.commitment();
    let index = note
        .index
        .filter(|&i| tree.leaf(i) == Some(commitment.0))
        .or_else(|| tree.index_of(&commitment.0))
        .ok_or(Error::UnknownInputCommitment(commitment))?;
    Ok(tree.witness(index)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReferenceBackend;
    use crate::proof::ProofVerifier;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn units(s: &str) -> Amount {
        Amount::parse_units(s).unwrap()
    }

    fn builder() -> TransactionBuilder {
        TransactionBuilder::new(&PoolConfig::default())
    }

    fn tree() -> MerkleTree {
        MerkleTree::new(5, 10).unwrap()
    }

    #[test]
    fn test_deposit_is_padded() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let alice = Keypair::generate(&mut rng);
        let request = TransactionRequest::new().with_output(Note::random_with(&mut rng, units("0.1"), alice.address()));

        let prepared = builder().prepare_with_rng(&tree(), request, &mut rng).unwrap();
        assert_eq!(prepared.variant(), CircuitVariant::Tx2);
        assert_eq!(prepared.ext_data.ext_amount, units("0.1").0 as i128);
        assert_eq!(prepared.public_inputs().input_nullifiers.len(), 2);
        assert_eq!(prepared.public_inputs().output_commitments.len(), 2);
        assert_eq!(prepared.ext_data.encrypted_outputs.len(), 2);
        assert_eq!(prepared.outputs()[1].amount, Amount::ZERO);
        assert_ne!(
            prepared.public_inputs().input_nullifiers[0],
            prepared.public_inputs().input_nullifiers[1]
        );
    }

    #[test]
    fn test_selects_large_variant() {
        let alice = Keypair::random();
        let request = TransactionRequest::new()
            .with_outputs((0..3).map(|_| Note::new(units("0.01"), alice.address())));
        let prepared = builder().prepare(&tree(), request).unwrap();
        assert_eq!(prepared.variant(), CircuitVariant::Tx16);
        assert_eq!(prepared.outputs().len(), 16);
    }

    #[test]
    fn test_too_many_outputs() {
        let alice = Keypair::random();
        let request = TransactionRequest::new()
            .with_outputs((0..17).map(|_| Note::new(Amount(1), alice.address())));
        assert_eq!(
            builder().prepare(&tree(), request).unwrap_err(),
            Error::TooManyOutputs { got: 17, max: 16 }
        );
    }

    #[test]
    fn test_unowned_input() {
        let alice = Keypair::random();
        let note = Note::new(units("0.1"), alice.address());
        let request = TransactionRequest::new().with_input(note, Keypair::from_address(alice.address()));
        assert_eq!(builder().prepare(&tree(), request).unwrap_err(), Error::UnownedInput(0));
    }

    #[test]
    fn test_deposit_bound() {
        let alice = Keypair::random();
        let request = TransactionRequest::new().with_output(Note::new(units("1.01"), alice.address()));
        assert!(matches!(
            builder().prepare(&tree(), request),
            Err(Error::AmountOutOfRange(_))
        ));
    }

    #[test]
    fn test_oversized_fee_is_rejected() {
        let alice = Keypair::random();
        let request = TransactionRequest::new()
            .with_output(Note::new(Amount(1), alice.address()))
            .with_fee(Amount(i128::MAX as u128));
        assert!(matches!(
            builder().prepare(&tree(), request),
            Err(Error::AmountOutOfRange(_))
        ));
    }

    #[test]
    fn test_withdrawal_bounds() {
        let alice = Keypair::random();
        let note = Note::new(units("0.1"), alice.address());
        let mut tree = tree();
        tree.insert(&[note.commitment().0, [0u8; 32]]).unwrap();

        // dust withdrawal
        let dust = TransactionRequest::new()
            .with_input(note.clone(), alice.clone())
            .with_output(Note::new(units("0.06"), alice.address()))
            .with_recipient(Address::random());
        assert!(matches!(builder().prepare(&tree, dust), Err(Error::AmountOutOfRange(_))));

        // no recipient
        let nowhere = TransactionRequest::new().with_input(note, alice.clone());
        assert_eq!(builder().prepare(&tree, nowhere).unwrap_err(), Error::MissingRecipient);
    }

    #[test]
    fn test_unknown_input() {
        let alice = Keypair::random();
        let note = Note::new(units("0.1"), alice.address()).at_index(0);
        let request = TransactionRequest::new()
            .with_input(note.clone(), alice)
            .with_output(Note::new(units("0.1"), Keypair::random().address()));
        assert_eq!(
            builder().prepare(&tree(), request).unwrap_err(),
            Error::UnknownInputCommitment(note.commitment())
        );
    }

    #[test]
    fn test_stale_index_is_corrected() {
        let alice = Keypair::random();
        let note = Note::new(units("0.1"), alice.address());
        let mut tree = tree();
        tree.insert(&[[1u8; 32], note.commitment().0]).unwrap();

        // wrong hint, the builder falls back to a lookup
        let request = TransactionRequest::new()
            .with_input(note.clone().at_index(0), alice.clone())
            .with_output(Note::new(units("0.1"), alice.address()));
        let prepared = builder().prepare(&tree, request).unwrap();
        assert_eq!(prepared.witness.inputs[0].path.index, 1);
        assert_eq!(
            prepared.public_inputs().input_nullifiers[0],
            note.nullifier_at(&alice, 1).unwrap()
        );
    }

    #[test]
    fn test_prepared_transaction_proves() {
        let backend = ReferenceBackend::from_label("builder");
        let alice = Keypair::random();
        let bob = Keypair::random();
        let note = Note::new(units("0.13"), alice.address());
        let mut tree = tree();
        tree.insert(&[note.commitment().0, [0u8; 32]]).unwrap();

        let request = TransactionRequest::new()
            .with_input(note, alice.clone())
            .with_output(Note::new(units("0.07"), alice.address()))
            .with_output(Note::new(units("0.05"), bob.address()))
            .with_relayer(Address::derive("relayer"))
            .with_fee(units("0.01"));
        let prepared = builder().prepare(&tree, request).unwrap();
        assert_eq!(prepared.ext_data.ext_amount, 0);

        let (proof, ext) = prepared.prove(&backend).unwrap();
        assert_eq!(proof.ext_data_hash, ext.hash());
        assert_eq!(proof.public_amount, -(units("0.01").0 as i128));
        assert!(backend.verify(proof.variant, &proof.proof, &proof.public_inputs()));
    }
}
