//! shared setup for pool integration tests

#![allow(dead_code)]

use std::sync::Arc;

use shielded_pool::{
    encode_payload, Address, Amount, BridgeAdapter, ExtData, InMemoryToken, Keypair, Note, PoolConfig, Proof,
    Receipt, ReferenceBackend, Result, ShieldedPool, TransactionBuilder, TransactionRequest,
};
use tracing_subscriber::EnvFilter;

pub type Pool = ShieldedPool<ReferenceBackend, InMemoryToken>;

pub fn units(s: &str) -> Amount {
    Amount::parse_units(s).unwrap()
}

/// `RUST_LOG=shielded_pool=debug cargo test` to see pool transitions
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> PoolConfig {
    PoolConfig {
        tree_height: 5,
        root_history_size: 30,
        ..PoolConfig::default()
    }
}

/// pool, bridge adapter and prover wired together
pub struct Harness {
    pub adapter: BridgeAdapter<ReferenceBackend, InMemoryToken>,
    pub backend: ReferenceBackend,
}

impl Harness {
    pub fn new(config: PoolConfig) -> Self {
        init_tracing();
        let backend = ReferenceBackend::from_label("integration");
        let token = InMemoryToken::new(config.token);
        let pool = ShieldedPool::new(config, backend.clone(), token).unwrap();
        Self {
            adapter: BridgeAdapter::new(Arc::new(pool)),
            backend,
        }
    }

    pub fn pool(&self) -> &Pool {
        self.adapter.pool()
    }

    pub fn config(&self) -> &PoolConfig {
        self.pool().config()
    }

    pub fn balance(&self, account: &Address) -> Amount {
        self.pool().token_balance(account)
    }

    pub fn bridge_balance(&self) -> Amount {
        self.balance(&self.config().bridge_account)
    }

    pub fn mint(&self, account: &Address, amount: Amount) {
        self.pool().with_token(|t| t.mint(account, amount));
    }

    /// tokens locked on the far side show up in the bridge escrow
    pub fn lock(&self, amount: Amount) {
        let bridge = self.config().bridge_account;
        self.mint(&bridge, amount);
    }

    /// prepare against the pool's current tree and prove
    pub fn prove(&self, request: TransactionRequest) -> Result<(Proof, ExtData)> {
        TransactionBuilder::new(self.config())
            .prepare(&self.pool().tree_snapshot(), request)?
            .prove(&self.backend)
    }

    /// lock the outputs' value on the far side and deliver them through the bridge
    pub fn bridge_deposit(&self, outputs: Vec<Note>) -> Result<Receipt> {
        let (proof, ext) = self.prove(TransactionRequest::new().with_outputs(outputs))?;
        let amount = Amount::from_signed_abs(ext.ext_amount);
        self.lock(amount);
        let payload = encode_payload(&proof, &ext)?;
        self.adapter.on_token_bridged(self.config().token, amount, &payload)
    }

    pub fn transact(&self, request: TransactionRequest, sender: &Address) -> Result<Receipt> {
        let (proof, ext) = self.prove(request)?;
        self.pool().submit(&proof, &ext, sender)
    }

    /// the wallet's view: unspent notes found in the event log
    pub fn notes_of(&self, keypair: &Keypair) -> Vec<Note> {
        keypair.scan(&self.pool().events())
    }
}

/// everything a rejected submission must leave untouched
#[derive(Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub root: shielded_pool::Root,
    pub commitments: u64,
    pub events: usize,
    pub balances: Vec<Amount>,
}

impl Harness {
    pub fn snapshot(&self, accounts: &[Address]) -> Snapshot {
        let mut balances: Vec<_> = accounts.iter().map(|a| self.balance(a)).collect();
        balances.push(self.pool().pool_balance());
        balances.push(self.bridge_balance());
        Snapshot {
            root: self.pool().root(),
            commitments: self.pool().commitment_count(),
            events: self.pool().events().len(),
            balances,
        }
    }
}
