//! pool state machine
//!
//! submissions move `Submitted -> Verifying -> {Accepted, Rejected}`.
//!
//! ```text
//! phase 1 (shared lock, runs in parallel)
//!   root in history window, nullifiers unspent
//!   amount bounds, recipient, ext data binding, proof
//! phase 2 (exclusive lock, one transaction at a time)
//!   re-check root + nullifiers, tree capacity, deposit funding
//!   settle tokens, insert commitments, record nullifiers, emit events
//! ```
//!
//! a rejection in either phase leaves tree, nullifiers and balances
//! untouched. rejected proofs are never retried here; the caller rebuilds.

mod events;
mod state;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use shielded_merkle::MerkleTree;
use tracing::{debug, info, instrument, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::ext_data::{Address, ExtData};
use crate::keys::ShieldedAddress;
use crate::nullifier::Nullifier;
use crate::proof::{Proof, ProofVerifier, Root};
use crate::token::TokenLedger;
use crate::value::{self, Amount};

pub use events::{PoolEvent, Receipt, TxState};
use state::{Applied, Funding, PoolState};

/// the shielded pool
pub struct ShieldedPool<V, T> {
    config: PoolConfig,
    verifier: V,
    state: RwLock<PoolState<T>>,
    next_id: AtomicU64,
}

impl<V: ProofVerifier, T: TokenLedger> ShieldedPool<V, T> {
    pub fn new(config: PoolConfig, verifier: V, token: T) -> Result<Self> {
        config.validate()?;
        if token.token() != config.token {
            return Err(Error::Config(format!(
                "ledger tracks {} but the pool is configured for {}",
                token.token(),
                config.token
            )));
        }
        let state = PoolState::new(&config, token)?;
        info!(
            tree_height = config.tree_height,
            root_history = config.root_history_size,
            token = %config.token,
            "shielded pool initialised"
        );
        Ok(Self {
            config,
            verifier,
            state: RwLock::new(state),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn root(&self) -> Root {
        Root(self.state.read().tree.root())
    }

    pub fn is_known_root(&self, root: &Root) -> bool {
        self.state.read().tree.is_known_root(&root.0)
    }

    pub fn is_spent(&self, nullifier: &Nullifier) -> bool {
        self.state.read().nullifiers.contains(nullifier)
    }

    /// copy of the commitment tree for building witnesses
    pub fn tree_snapshot(&self) -> MerkleTree {
        self.state.read().tree.clone()
    }

    pub fn commitment_count(&self) -> u64 {
        self.state.read().tree.len()
    }

    pub fn events(&self) -> Vec<PoolEvent> {
        self.state.read().events.clone()
    }

    /// events from position `from` onwards
    pub fn events_since(&self, from: usize) -> Vec<PoolEvent> {
        let state = self.state.read();
        state.events.get(from..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn token_balance(&self, account: &Address) -> Amount {
        self.state.read().token.balance_of(account)
    }

    /// tokens held by the pool
    pub fn pool_balance(&self) -> Amount {
        self.token_balance(&self.config.pool_account)
    }

    /// run `f` with exclusive access to the token ledger; movements of the
    /// pool account made here become the new baseline for bridged credits
    pub fn with_token<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.state.write();
        let out = f(&mut state.token);
        state.last_balance = state.token.balance_of(&self.config.pool_account);
        out
    }

    pub fn registered(&self, owner: &Address) -> Option<ShieldedAddress> {
        self.state.read().registry.get(owner).copied()
    }

    /// publish the shielded address of `owner`
    pub fn register(&self, owner: Address, address: ShieldedAddress) {
        let mut state = self.state.write();
        state.registry.insert(owner, address);
        state.events.push(PoolEvent::PublicKeyRegistered { owner, address });
        debug!(%owner, "registered shielded address");
    }

    /// verify and apply a transaction; deposits are pulled from `sender`
    #[instrument(skip_all, fields(tx = tracing::field::Empty))]
    pub fn submit(&self, proof: &Proof, ext: &ExtData, sender: &Address) -> Result<Receipt> {
        let id = self.begin();
        self.verify(id, proof, ext)?;

        let applied = {
            let mut state = self.state.write();
            state.apply(&self.config, proof, ext, Funding::Caller(sender))
        };
        self.finish(id, proof, applied)
    }

    /// register `owner` and submit, both or neither
    #[instrument(skip_all, fields(tx = tracing::field::Empty))]
    pub fn register_and_submit(
        &self,
        owner: Address,
        address: ShieldedAddress,
        proof: &Proof,
        ext: &ExtData,
    ) -> Result<Receipt> {
        let id = self.begin();
        self.verify(id, proof, ext)?;

        let applied = {
            let mut state = self.state.write();
            let applied = state.apply(&self.config, proof, ext, Funding::Caller(&owner));
            if applied.is_ok() {
                state.registry.insert(owner, address);
                state.events.push(PoolEvent::PublicKeyRegistered { owner, address });
            }
            applied
        };
        self.finish(id, proof, applied)
    }

    /// bridged deposit: credit `amount` from the bridge escrow and apply the
    /// transaction under one exclusive lock, reversing the credit on rejection
    #[instrument(skip_all, fields(tx = tracing::field::Empty, %amount))]
    pub(crate) fn transact_bridged(&self, proof: &Proof, ext: &ExtData, amount: Amount) -> Result<Receipt> {
        let id = self.begin();
        self.verify(id, proof, ext)?;

        let bridge = self.config.bridge_account;
        let pool = self.config.pool_account;
        let applied = {
            let mut state = self.state.write();
            let available = state.token.balance_of(&bridge);
            if available < amount {
                Err(Error::InsufficientDeposit { required: amount, available })
            } else {
                match state.token.transfer(&bridge, &pool, amount) {
                    Ok(()) => {
                        let applied = state.apply(&self.config, proof, ext, Funding::Bridged);
                        if applied.is_err() {
                            // keep the lock escrowed for reconciliation
                            if let Err(e) = state.token.transfer(&pool, &bridge, amount) {
                                warn!("failed to reverse bridge credit: {e}");
                            }
                        }
                        applied
                    }
                    Err(e) => Err(e),
                }
            }
        };
        self.finish(id, proof, applied)
    }

    fn begin(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::Span::current().record("tx", id);
        debug!(state = %TxState::Submitted);
        id
    }

    /// phase 1, no mutation
    fn verify(&self, id: u64, proof: &Proof, ext: &ExtData) -> Result<()> {
        debug!(state = %TxState::Verifying);
        let checked = self.state.read().check(proof);
        checked
            .and_then(|()| self.check_stateless(proof, ext))
            .map_err(|e| self.reject(id, e))
    }

    fn check_stateless(&self, proof: &Proof, ext: &ExtData) -> Result<()> {
        proof.check_arity()?;

        let magnitude = Amount::from_signed_abs(ext.ext_amount);
        if ext.is_deposit() && magnitude > self.config.maximum_deposit_amount {
            return Err(Error::AmountOutOfRange(format!(
                "deposit {magnitude} above maximum {}",
                self.config.maximum_deposit_amount
            )));
        }
        if ext.is_withdrawal() && magnitude < self.config.minimum_withdrawal_amount {
            return Err(Error::AmountOutOfRange(format!(
                "withdrawal {magnitude} below minimum {}",
                self.config.minimum_withdrawal_amount
            )));
        }
        let public_amount = value::public_amount(ext.ext_amount, ext.fee)?;

        if ext.is_withdrawal() && ext.recipient.is_zero() {
            return Err(Error::MissingRecipient);
        }

        if proof.ext_data_hash != ext.hash() {
            return Err(Error::InvalidProof("ext data hash mismatch".into()));
        }
        if proof.public_amount != public_amount {
            return Err(Error::InvalidProof("public amount does not match ext data".into()));
        }
        if ext.encrypted_outputs.len() != proof.output_commitments.len() {
            return Err(Error::InvalidProof(format!(
                "expected {} encrypted outputs, got {}",
                proof.output_commitments.len(),
                ext.encrypted_outputs.len()
            )));
        }
        let mut seen = HashSet::with_capacity(proof.input_nullifiers.len());
        if let Some(dup) = proof.input_nullifiers.iter().find(|nf| !seen.insert(**nf)) {
            return Err(Error::InvalidProof(format!("duplicate nullifier {dup}")));
        }

        if !self.verifier.verify(proof.variant, &proof.proof, &proof.public_inputs()) {
            return Err(Error::InvalidProof("verification failed".into()));
        }
        Ok(())
    }

    fn finish(&self, id: u64, proof: &Proof, applied: Result<Applied>) -> Result<Receipt> {
        let applied = applied.map_err(|e| self.reject(id, e))?;
        info!(
            state = %TxState::Accepted,
            root = %applied.root,
            first_index = applied.first_index,
            "transaction accepted"
        );
        Ok(Receipt {
            tx_id: id,
            state: TxState::Accepted,
            root: applied.root,
            first_index: applied.first_index,
            output_count: proof.output_commitments.len(),
        })
    }

    fn reject(&self, id: u64, err: Error) -> Error {
        warn!(tx = id, state = %TxState::Rejected, reason = %err, "transaction rejected");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReferenceBackend;
    use crate::builder::{TransactionBuilder, TransactionRequest};
    use crate::keys::Keypair;
    use crate::note::Note;
    use crate::proof::{CircuitVariant, PublicInputs, ZkProof};
    use crate::token::InMemoryToken;

    type Pool = ShieldedPool<ReferenceBackend, InMemoryToken>;

    fn units(s: &str) -> Amount {
        Amount::parse_units(s).unwrap()
    }

    fn config() -> PoolConfig {
        PoolConfig {
            tree_height: 5,
            root_history_size: 3,
            ..PoolConfig::default()
        }
    }

    fn pool_with(config: PoolConfig) -> (Pool, ReferenceBackend) {
        let backend = ReferenceBackend::from_label("pool-tests");
        let token = InMemoryToken::new(config.token);
        (ShieldedPool::new(config, backend.clone(), token).unwrap(), backend)
    }

    fn deposit(pool: &Pool, backend: &ReferenceBackend, owner: &Keypair, amount: &str, sender: &Address) -> Result<(Note, Receipt)> {
        let note = Note::new(units(amount), owner.address());
        let request = TransactionRequest::new().with_output(note.clone());
        let prepared = TransactionBuilder::new(pool.config()).prepare(&pool.tree_snapshot(), request)?;
        let (proof, ext) = prepared.prove(backend)?;
        let receipt = pool.submit(&proof, &ext, sender)?;
        Ok((note.at_index(receipt.first_index), receipt))
    }

    #[test]
    fn test_direct_deposit_and_withdraw() {
        let (pool, backend) = pool_with(config());
        let alice = Keypair::random();
        let funder = Address::derive("funder");
        pool.with_token(|t| t.mint(&funder, units("0.5")));

        let (note, receipt) = deposit(&pool, &backend, &alice, "0.3", &funder).unwrap();
        assert_eq!(receipt.first_index, 0);
        assert_eq!(receipt.output_indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(pool.pool_balance(), units("0.3"));
        assert_eq!(pool.token_balance(&funder), units("0.2"));
        assert_eq!(pool.commitment_count(), 2);

        let recipient = Address::random();
        let relayer = Address::derive("relayer");
        let request = TransactionRequest::new()
            .with_input(note, alice.clone())
            .with_output(Note::new(units("0.1"), alice.address()))
            .with_recipient(recipient)
            .with_relayer(relayer)
            .with_fee(units("0.01"));
        let (proof, ext) = TransactionBuilder::new(pool.config())
            .prepare(&pool.tree_snapshot(), request)
            .unwrap()
            .prove(&backend)
            .unwrap();
        pool.submit(&proof, &ext, &relayer).unwrap();

        assert_eq!(pool.token_balance(&recipient), units("0.19"));
        assert_eq!(pool.token_balance(&relayer), units("0.01"));
        assert_eq!(pool.pool_balance(), units("0.1"));
        assert!(proof.input_nullifiers.iter().all(|nf| pool.is_spent(nf)));
    }

    #[test]
    fn test_deposit_without_funds() {
        let (pool, backend) = pool_with(config());
        let alice = Keypair::random();
        let broke = Address::derive("broke");

        let err = deposit(&pool, &backend, &alice, "0.3", &broke).unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientDeposit { required: units("0.3"), available: Amount::ZERO }
        );
        assert_eq!(pool.commitment_count(), 0);
        assert!(pool.events().is_empty());
    }

    #[test]
    fn test_double_spend() {
        let (pool, backend) = pool_with(config());
        let funder = Address::derive("funder");
        pool.with_token(|t| t.mint(&funder, units("1")));

        let alice = Keypair::random();
        let request = TransactionRequest::new().with_output(Note::new(units("0.2"), alice.address()));
        let (proof, ext) = TransactionBuilder::new(pool.config())
            .prepare(&pool.tree_snapshot(), request)
            .unwrap()
            .prove(&backend)
            .unwrap();

        pool.submit(&proof, &ext, &funder).unwrap();
        assert!(matches!(
            pool.submit(&proof, &ext, &funder),
            Err(Error::NullifierAlreadySpent(_))
        ));
        assert_eq!(pool.pool_balance(), units("0.2"));
    }

    #[test]
    fn test_stale_root_window() {
        let (pool, backend) = pool_with(config());
        let funder = Address::derive("funder");
        pool.with_token(|t| t.mint(&funder, units("1")));
        let alice = Keypair::random();

        // prepared against the genesis root
        let request = TransactionRequest::new().with_output(Note::new(units("0.1"), alice.address()));
        let (stale_proof, stale_ext) = TransactionBuilder::new(pool.config())
            .prepare(&pool.tree_snapshot(), request)
            .unwrap()
            .prove(&backend)
            .unwrap();

        // window of 3: genesis survives two more roots, not three
        deposit(&pool, &backend, &alice, "0.1", &funder).unwrap();
        deposit(&pool, &backend, &alice, "0.1", &funder).unwrap();
        deposit(&pool, &backend, &alice, "0.1", &funder).unwrap();
        assert!(!pool.is_known_root(&stale_proof.root));
        assert_eq!(pool.submit(&stale_proof, &stale_ext, &funder), Err(Error::UnknownRoot));
    }

    #[test]
    fn test_tampered_ext_data() {
        let (pool, backend) = pool_with(config());
        let funder = Address::derive("funder");
        pool.with_token(|t| t.mint(&funder, units("1")));
        let alice = Keypair::random();
        let (note, _) = deposit(&pool, &backend, &alice, "0.2", &funder).unwrap();

        let request = TransactionRequest::new()
            .with_input(note, alice.clone())
            .with_recipient(Address::derive("honest"));
        let (proof, mut ext) = TransactionBuilder::new(pool.config())
            .prepare(&pool.tree_snapshot(), request)
            .unwrap()
            .prove(&backend)
            .unwrap();

        ext.recipient = Address::derive("thief");
        assert!(matches!(pool.submit(&proof, &ext, &funder), Err(Error::InvalidProof(_))));
        assert_eq!(pool.pool_balance(), units("0.2"));
        assert_eq!(pool.token_balance(&Address::derive("thief")), Amount::ZERO);
    }

    #[test]
    fn test_forged_proof() {
        let (pool, _) = pool_with(config());
        let ext = ExtData {
            recipient: Address::ZERO,
            ext_amount: 0,
            relayer: Address::ZERO,
            fee: Amount::ZERO,
            encrypted_outputs: vec![vec![], vec![]],
            is_cross_chain_withdrawal: false,
            l1_fee: Amount::ZERO,
        };
        let public = PublicInputs {
            root: pool.root(),
            input_nullifiers: vec![Nullifier([1u8; 32]), Nullifier([2u8; 32])],
            output_commitments: vec![Default::default(), Default::default()],
            public_amount: 0,
            ext_data_hash: ext.hash(),
        };
        let proof = Proof::new(CircuitVariant::Tx2, ZkProof(vec![0u8; 32]), public);
        assert_eq!(
            pool.submit(&proof, &ext, &Address::ZERO),
            Err(Error::InvalidProof("verification failed".into()))
        );
    }

    #[test]
    fn test_tree_full() {
        let (pool, backend) = pool_with(PoolConfig {
            tree_height: 2,
            ..config()
        });
        let funder = Address::derive("funder");
        pool.with_token(|t| t.mint(&funder, units("1")));
        let alice = Keypair::random();

        deposit(&pool, &backend, &alice, "0.1", &funder).unwrap();
        deposit(&pool, &backend, &alice, "0.1", &funder).unwrap();
        let err = deposit(&pool, &backend, &alice, "0.1", &funder).unwrap_err();
        assert_eq!(err, Error::TreeFull { capacity: 4, requested: 2 });
        assert_eq!(pool.pool_balance(), units("0.2"));
    }

    #[test]
    fn test_register_and_submit() {
        let (pool, backend) = pool_with(config());
        let owner = Address::derive("owner");
        let alice = Keypair::random();

        let request = TransactionRequest::new().with_output(Note::new(units("0.1"), alice.address()));
        let (proof, ext) = TransactionBuilder::new(pool.config())
            .prepare(&pool.tree_snapshot(), request)
            .unwrap()
            .prove(&backend)
            .unwrap();

        // unfunded: neither registration nor deposit happen
        assert!(pool.register_and_submit(owner, alice.address(), &proof, &ext).is_err());
        assert_eq!(pool.registered(&owner), None);

        pool.with_token(|t| t.mint(&owner, units("0.1")));
        pool.register_and_submit(owner, alice.address(), &proof, &ext).unwrap();
        assert_eq!(pool.registered(&owner), Some(alice.address()));
        assert!(pool
            .events()
            .contains(&PoolEvent::PublicKeyRegistered { owner, address: alice.address() }));
    }

    #[test]
    fn test_treasury_fee_policy() {
        let treasury = Address::derive("treasury");
        let (pool, backend) = pool_with(PoolConfig {
            fee_recipient: crate::config::FeeRecipient::Treasury(treasury),
            ..config()
        });
        let funder = Address::derive("funder");
        pool.with_token(|t| t.mint(&funder, units("1")));
        let alice = Keypair::random();
        let (note, _) = deposit(&pool, &backend, &alice, "0.2", &funder).unwrap();

        let relayer = Address::derive("relayer");
        let request = TransactionRequest::new()
            .with_input(note, alice.clone())
            .with_output(Note::new(units("0.19"), alice.address()))
            .with_relayer(relayer)
            .with_fee(units("0.01"));
        let (proof, ext) = TransactionBuilder::new(pool.config())
            .prepare(&pool.tree_snapshot(), request)
            .unwrap()
            .prove(&backend)
            .unwrap();
        pool.submit(&proof, &ext, &relayer).unwrap();

        assert_eq!(pool.token_balance(&treasury), units("0.01"));
        assert_eq!(pool.token_balance(&relayer), Amount::ZERO);
        assert_eq!(pool.pool_balance(), units("0.19"));
    }

    #[test]
    fn test_wallet_scan() {
        let (pool, backend) = pool_with(config());
        let funder = Address::derive("funder");
        pool.with_token(|t| t.mint(&funder, units("1")));
        let alice = Keypair::random();

        let (note, _) = deposit(&pool, &backend, &alice, "0.3", &funder).unwrap();
        let found = alice.scan(&pool.events());
        assert_eq!(found, vec![note.clone()]);

        let request = TransactionRequest::new()
            .with_input(note, alice.clone())
            .with_output(Note::new(units("0.1"), alice.address()))
            .with_recipient(Address::random());
        let (proof, ext) = TransactionBuilder::new(pool.config())
            .prepare(&pool.tree_snapshot(), request)
            .unwrap()
            .prove(&backend)
            .unwrap();
        let receipt = pool.submit(&proof, &ext, &funder).unwrap();

        let found = alice.scan(&pool.events());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].amount, units("0.1"));
        assert_eq!(found[0].index, Some(receipt.first_index));
        assert!(Keypair::random().scan(&pool.events()).is_empty());
    }

    #[test]
    fn test_wallet_scan_ignores_uncommitted_ciphertext() {
        let (pool, backend) = pool_with(config());
        let funder = Address::derive("funder");
        pool.with_token(|t| t.mint(&funder, units("1")));
        let alice = Keypair::random();

        // the sender commits 0.1 but publishes a ciphertext claiming 0.9
        let request = TransactionRequest::new().with_output(Note::new(units("0.1"), alice.address()));
        let mut prepared = TransactionBuilder::new(pool.config())
            .prepare(&pool.tree_snapshot(), request)
            .unwrap();
        prepared.ext_data.encrypted_outputs[0] = Note::new(units("0.9"), alice.address()).encrypt().unwrap();
        prepared.witness.public.ext_data_hash = prepared.ext_data.hash();
        let (proof, ext) = prepared.prove(&backend).unwrap();
        pool.submit(&proof, &ext, &funder).unwrap();

        assert!(alice.scan(&pool.events()).is_empty());
    }
}
