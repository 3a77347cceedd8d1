//! bridge adapter
//!
//! the bridge locks tokens on the far side, then delivers
//! `(token, amount, payload)` where the payload is the SCALE encoding of
//! `(Proof, ExtData)`. the adapter turns that into one atomic pool call:
//! either the proof is accepted and `amount` moves from the bridge escrow
//! into the pool, or nothing moves.

use std::sync::Arc;

use scale_codec::{DecodeAll, Encode};
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::ext_data::{Address, ExtData};
use crate::pool::{PoolEvent, Receipt, ShieldedPool};
use crate::proof::{Proof, ProofVerifier};
use crate::token::TokenLedger;
use crate::value::Amount;

/// encode a transaction for delivery through the bridge
pub fn encode_payload(proof: &Proof, ext: &ExtData) -> Result<Vec<u8>> {
    proof.check_arity()?;
    Ok((proof, ext).encode())
}

/// decode a bridge payload; trailing bytes are an error
pub fn decode_payload(payload: &[u8]) -> Result<(Proof, ExtData)> {
    Ok(<(Proof, ExtData)>::decode_all(&mut &payload[..])?)
}

/// a withdrawal the bridge must deliver on the far side
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub recipient: Address,
    pub amount: Amount,
    pub l1_fee: Amount,
}

/// entry point for bridged deposits
pub struct BridgeAdapter<V, T> {
    pool: Arc<ShieldedPool<V, T>>,
}

impl<V, T> Clone for BridgeAdapter<V, T> {
    fn clone(&self) -> Self {
        Self { pool: Arc::clone(&self.pool) }
    }
}

impl<V: ProofVerifier, T: TokenLedger> BridgeAdapter<V, T> {
    pub fn new(pool: Arc<ShieldedPool<V, T>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ShieldedPool<V, T>> {
        &self.pool
    }

    /// handle a bridged transfer of `amount` of `token` carrying `payload`
    #[instrument(skip_all, fields(%token, %amount, payload_len = payload.len()))]
    pub fn on_token_bridged(&self, token: Address, amount: Amount, payload: &[u8]) -> Result<Receipt> {
        let result = self.process(token, amount, payload);
        match &result {
            Ok(receipt) => info!(tx = receipt.tx_id, "bridged deposit accepted"),
            Err(e) => warn!(reason = %e, "bridged deposit rejected, lock left for reconciliation"),
        }
        result
    }

    fn process(&self, token: Address, amount: Amount, payload: &[u8]) -> Result<Receipt> {
        if token != self.pool.config().token {
            return Err(Error::UnsupportedToken(token));
        }
        let (proof, ext) = decode_payload(payload)?;
        if ext.ext_amount <= 0 || Amount::from_signed_abs(ext.ext_amount) != amount {
            return Err(Error::BridgeAmountMismatch {
                bridged: amount,
                ext_amount: ext.ext_amount,
            });
        }
        self.pool.transact_bridged(&proof, &ext, amount)
    }

    /// cross-chain withdrawals recorded by the pool, oldest first
    pub fn withdrawal_requests(&self) -> Vec<WithdrawalRequest> {
        self.pool
            .events()
            .into_iter()
            .filter_map(|event| match event {
                PoolEvent::CrossChainWithdrawal { recipient, amount, l1_fee } => {
                    Some(WithdrawalRequest { recipient, amount, l1_fee })
                }
                _ => None,
            })
            .collect()
    }
}
