use std::error::Error;

use aggregator_bundle::{Bundle, PublicKey};
use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of simulating one bundle on top of the bundles simulated before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSimulation {
    /// Per-operation success flags, in bundle order.
    pub operation_results: Vec<bool>,
    /// Fee collected by the aggregator, in fee-token units.
    pub fee: U256,
    pub error: Option<String>,
}

impl BundleSimulation {
    pub fn any_operation_succeeded(&self) -> bool {
        self.operation_results.iter().any(|ok| *ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub success: bool,
}

#[derive(Error, Debug)]
pub enum ExecutionClientError {
    #[error("Nonce not yet valid: {0}")]
    NonceNotYetValid(String),

    #[error("Transaction {0} was not included in time")]
    InclusionFailed(B256),

    #[error("Transaction rejected by node: {0}")]
    Rejected(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Internal execution client error: {0}")]
    Internal(#[source] Box<dyn Error + Send + Sync>),
}

impl ExecutionClientError {
    /// The node refused the transaction because its nonce is ahead of the account.
    /// The same transaction can be sent again later.
    pub fn is_nonce_not_yet_valid(&self) -> bool {
        matches!(self, Self::NonceNotYetValid(_))
    }

    /// Errors raised while waiting for inclusion, after the transaction was accepted.
    pub fn is_inclusion_failure(&self) -> bool {
        matches!(self, Self::InclusionFailed(_))
    }
}

pub type Result<T, E = ExecutionClientError> = std::result::Result<T, E>;

/// Trait for every chain backend the aggregator can submit to
#[automock]
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Should return the current block number of the chain.
    async fn block_number(&self) -> Result<u64>;

    /// Should yield every new block number as it is observed.
    fn block_stream(&self) -> BoxStream<'static, Result<u64>>;

    /// Should return the next unused nonce of the wallet owning `public_key`.
    async fn wallet_nonce(&self, public_key: &PublicKey) -> Result<U256>;

    /// Should simulate `bundles` sequentially, each one seeing the state left by the
    /// ones before it, and return one outcome per bundle.
    async fn simulate(&self, bundles: &[Bundle]) -> Result<Vec<BundleSimulation>>;

    /// Should estimate the gas needed to process `bundle` on its own.
    async fn estimate_gas(&self, bundle: &Bundle) -> Result<u64>;

    /// Should return the current gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Should return the transaction count of the aggregator's own account, to be used as nonce.
    async fn account_nonce(&self) -> Result<u64>;

    /// Should send `bundle` for processing with the given account nonce and return the
    /// transaction hash.
    async fn submit(&self, bundle: &Bundle, nonce: u64) -> Result<B256>;

    /// Should wait until `tx_hash` is mined and return its receipt, reverted or not.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<SubmissionReceipt>;
}
