//! In-process chain and signer used by the service tests.
//!
//! The chain keeps one nonce per wallet. An operation succeeds in simulation when its
//! nonce is the wallet's next one, and pays the value of its actions as fee.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use aggregator_bundle::{Bundle, Operation, PublicKey};
use aggregator_execution_client_interface::{
    BundleSimulation, ExecutionClient, ExecutionClientError, Result, SubmissionReceipt,
};
use aggregator_signer_interface::{BundleSigner, SignerError};
use alloy_primitives::{keccak256, B256, U256};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, watch, Semaphore};
use tokio_stream::wrappers::BroadcastStream;

use crate::tests::common::BAD_SIGNATURE;

pub const BASE_GAS: u64 = 50_000;
pub const GAS_PER_OPERATION: u64 = 30_000;

#[derive(Default)]
struct ChainState {
    block: u64,
    wallet_nonces: HashMap<PublicKey, U256>,
    account_nonce: u64,
    pending: HashMap<B256, Bundle>,
    reverts_left: usize,
}

pub struct FakeChain {
    state: Mutex<ChainState>,
    gas_price: u128,
    blocks: broadcast::Sender<u64>,
    submitted: watch::Sender<Vec<(Bundle, u64)>>,
    receipt_gate: Option<Semaphore>,
}

impl Default for FakeChain {
    fn default() -> Self {
        let (blocks, _) = broadcast::channel(64);
        let (submitted, _) = watch::channel(Vec::new());
        Self { state: Mutex::default(), gas_price: 1, blocks, submitted, receipt_gate: None }
    }
}

impl FakeChain {
    /// Receipts are only handed out once released with [`FakeChain::release_receipts`].
    pub fn with_gated_receipts() -> Self {
        Self { receipt_gate: Some(Semaphore::new(0)), ..Self::default() }
    }

    pub fn release_receipts(&self, count: usize) {
        if let Some(gate) = &self.receipt_gate {
            gate.add_permits(count);
        }
    }

    pub fn set_wallet_nonce(&self, public_key: PublicKey, nonce: u64) {
        self.state().wallet_nonces.insert(public_key, U256::from(nonce));
    }

    pub fn revert_next_receipts(&self, count: usize) {
        self.state().reverts_left = count;
    }

    pub fn advance_block(&self) -> u64 {
        let block = {
            let mut state = self.state();
            state.block += 1;
            state.block
        };
        let _ = self.blocks.send(block);
        block
    }

    pub fn advance_blocks(&self, count: u64) -> u64 {
        let mut block = self.current_block();
        for _ in 0..count {
            block = self.advance_block();
        }
        block
    }

    pub fn current_block(&self) -> u64 {
        self.state().block
    }

    /// Every `(bundle, nonce)` handed to `submit`, in order.
    pub fn submitted(&self) -> Vec<(Bundle, u64)> {
        self.submitted.borrow().clone()
    }

    pub async fn wait_for_submitted(&self, count: usize) {
        let mut receiver = self.submitted.subscribe();
        let _ = receiver.wait_for(|submitted| submitted.len() >= count).await;
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().expect("fake chain state")
    }
}

fn operation_fee(operation: &Operation) -> U256 {
    operation.actions.iter().fold(U256::ZERO, |fee, action| fee + action.value)
}

#[async_trait]
impl ExecutionClient for FakeChain {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.current_block())
    }

    fn block_stream(&self) -> BoxStream<'static, Result<u64>> {
        BroadcastStream::new(self.blocks.subscribe())
            .filter_map(|block| futures::future::ready(block.ok().map(Ok)))
            .boxed()
    }

    async fn wallet_nonce(&self, public_key: &PublicKey) -> Result<U256> {
        Ok(self.state().wallet_nonces.get(public_key).copied().unwrap_or_default())
    }

    async fn simulate(&self, bundles: &[Bundle]) -> Result<Vec<BundleSimulation>> {
        let mut scratch = self.state().wallet_nonces.clone();
        Ok(bundles
            .iter()
            .map(|bundle| {
                let mut fee = U256::ZERO;
                let operation_results: Vec<bool> = bundle
                    .entries()
                    .map(|(key, operation)| {
                        let next = scratch.entry(*key).or_default();
                        let ok = operation.nonce == *next;
                        if ok {
                            *next += U256::from(1);
                            fee += operation_fee(operation);
                        }
                        ok
                    })
                    .collect();
                let error = (!operation_results.iter().any(|ok| *ok)).then(|| "all operations failed".to_string());
                BundleSimulation { operation_results, fee, error }
            })
            .collect())
    }

    async fn estimate_gas(&self, bundle: &Bundle) -> Result<u64> {
        Ok(BASE_GAS + GAS_PER_OPERATION * bundle.operation_count() as u64)
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.gas_price)
    }

    async fn account_nonce(&self) -> Result<u64> {
        Ok(self.state().account_nonce)
    }

    async fn submit(&self, bundle: &Bundle, nonce: u64) -> Result<B256> {
        let mut preimage = bundle.content_hash().to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = keccak256(preimage);
        self.state().pending.insert(tx_hash, bundle.clone());
        self.submitted.send_modify(|submitted| submitted.push((bundle.clone(), nonce)));
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<SubmissionReceipt> {
        if let Some(gate) = &self.receipt_gate {
            gate.acquire().await.map_err(|e| ExecutionClientError::Internal(Box::new(e)))?.forget();
        }

        let mut state = self.state();
        let bundle = state.pending.remove(&tx_hash).ok_or(ExecutionClientError::InclusionFailed(tx_hash))?;
        state.account_nonce += 1;
        let block_number = state.block;

        if state.reverts_left > 0 {
            state.reverts_left -= 1;
            return Ok(SubmissionReceipt { transaction_hash: tx_hash, block_number, gas_used: 21_000, success: false });
        }

        for (key, operation) in bundle.entries() {
            let next = state.wallet_nonces.entry(*key).or_default();
            if operation.nonce == *next {
                *next += U256::from(1);
            }
        }
        let gas_used = BASE_GAS + GAS_PER_OPERATION * bundle.operation_count() as u64;
        Ok(SubmissionReceipt { transaction_hash: tx_hash, block_number, gas_used, success: true })
    }
}

/// Concatenating signer. Rejects bundles whose first signature word is [`BAD_SIGNATURE`].
pub struct FakeSigner;

#[async_trait]
impl BundleSigner for FakeSigner {
    async fn verify(&self, bundle: &Bundle) -> std::result::Result<bool, SignerError> {
        Ok(bundle.signature[0] != U256::from(BAD_SIGNATURE))
    }

    async fn aggregate(&self, bundles: &[Bundle]) -> std::result::Result<Bundle, SignerError> {
        let mut aggregate = Bundle::empty();
        for bundle in bundles {
            aggregate.sender_public_keys.extend(bundle.sender_public_keys.iter().copied());
            aggregate.operations.extend(bundle.operations.iter().cloned());
        }
        if !bundles.is_empty() {
            aggregate.signature = [U256::from(1), U256::from(bundles.len())];
        }
        Ok(aggregate)
    }

    async fn probe_bundle(&self, operation_count: usize) -> std::result::Result<Bundle, SignerError> {
        Ok(Bundle {
            sender_public_keys: (0..operation_count).map(|index| [U256::from(u64::MAX - index as u64); 4]).collect(),
            operations: (0..operation_count).map(|_| Operation { nonce: U256::ZERO, actions: Vec::new() }).collect(),
            signature: [U256::from(1), U256::ZERO],
        })
    }
}
