use std::time::Duration;

use aggregator_bundle::abi::{BundleData, IBundleGateway, IBundleSimulator, SimulationResult};
use aggregator_bundle::{Bundle, PublicKey};
use aggregator_execution_client_interface::{
    BundleSimulation, ExecutionClient, ExecutionClientError, Result, SubmissionReceipt,
};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

mod error;

use crate::error::{classify_rpc_error, is_already_known, RpcContext};

/// Headroom added on top of the node's gas estimate, in percent.
const GAS_LIMIT_MARGIN_PERCENT: u64 = 120;

#[derive(Clone, Debug)]
pub struct EthereumExecutionValidatedArgs {
    pub ethereum_rpc_url: Url,

    pub ethereum_private_key: String,

    pub gateway_address: Address,

    pub simulator_address: Address,

    /// Token fees are paid in, zero address for ether.
    pub fee_token: Address,

    pub block_poll_interval: Duration,

    pub receipt_poll_interval: Duration,

    pub receipt_timeout: Duration,
}

pub struct EthereumExecutionClient {
    provider: DynProvider,
    wallet: EthereumWallet,
    wallet_address: Address,
    gateway_address: Address,
    simulator_address: Address,
    fee_token: Address,
    block_poll_interval: Duration,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl EthereumExecutionClient {
    pub fn new_with_args(args: &EthereumExecutionValidatedArgs) -> Result<Self> {
        let signer: PrivateKeySigner =
            args.ethereum_private_key.parse().map_err(|e| ExecutionClientError::Internal(Box::new(e)))?;
        let wallet_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().connect_http(args.ethereum_rpc_url.clone()).erased();

        info!(
            wallet = %wallet_address,
            gateway = %args.gateway_address,
            simulator = %args.simulator_address,
            "Ethereum execution client initialised"
        );

        Ok(Self {
            provider,
            wallet,
            wallet_address,
            gateway_address: args.gateway_address,
            simulator_address: args.simulator_address,
            fee_token: args.fee_token,
            block_poll_interval: args.block_poll_interval,
            receipt_poll_interval: args.receipt_poll_interval,
            receipt_timeout: args.receipt_timeout,
        })
    }

    pub fn wallet_address(&self) -> Address {
        self.wallet_address
    }

    fn process_bundle_request(&self, bundle: &Bundle) -> TransactionRequest {
        let call = IBundleGateway::processBundleCall { bundle: BundleData::from(bundle) };
        TransactionRequest::default()
            .with_from(self.wallet_address)
            .with_to(self.gateway_address)
            .with_input(Bytes::from(call.abi_encode()))
    }

    async fn eth_call(&self, to: Address, input: Vec<u8>) -> Result<Bytes> {
        let request =
            TransactionRequest::default().with_from(self.wallet_address).with_to(to).with_input(Bytes::from(input));
        self.provider.call(request).await.map_err(|e| classify_rpc_error(e, RpcContext::Read))
    }
}

#[async_trait]
impl ExecutionClient for EthereumExecutionClient {
    async fn block_number(&self) -> Result<u64> {
        self.provider.get_block_number().await.map_err(|e| classify_rpc_error(e, RpcContext::Read))
    }

    /// Polls `eth_blockNumber` and yields each number the first time it is seen.
    fn block_stream(&self) -> BoxStream<'static, Result<u64>> {
        let provider = self.provider.clone();
        let interval = self.block_poll_interval;

        stream::unfold((provider, None::<u64>), move |(provider, last_seen)| async move {
            loop {
                match provider.get_block_number().await {
                    Ok(block) if Some(block) != last_seen => return Some((Ok(block), (provider, Some(block)))),
                    Ok(_) => sleep(interval).await,
                    Err(e) => {
                        sleep(interval).await;
                        return Some((Err(classify_rpc_error(e, RpcContext::Read)), (provider, last_seen)));
                    }
                }
            }
        })
        .boxed()
    }

    async fn wallet_nonce(&self, public_key: &PublicKey) -> Result<U256> {
        let call = IBundleGateway::noncesCall { publicKey: *public_key };
        let output = self.eth_call(self.gateway_address, call.abi_encode()).await?;
        U256::abi_decode(&output).map_err(|e| ExecutionClientError::Contract(e.to_string()))
    }

    async fn simulate(&self, bundles: &[Bundle]) -> Result<Vec<BundleSimulation>> {
        let call = IBundleSimulator::simulateCall {
            feeToken: self.fee_token,
            beneficiary: self.wallet_address,
            bundles: bundles.iter().map(BundleData::from).collect(),
        };
        let output = self.eth_call(self.simulator_address, call.abi_encode()).await?;
        let results = <Vec<SimulationResult>>::abi_decode(&output)
            .map_err(|e| ExecutionClientError::Contract(e.to_string()))?;

        if results.len() != bundles.len() {
            return Err(ExecutionClientError::Contract(format!(
                "simulator returned {} results for {} bundles",
                results.len(),
                bundles.len()
            )));
        }

        Ok(results
            .into_iter()
            .map(|result| BundleSimulation {
                operation_results: result.successes,
                fee: result.fee,
                error: (!result.error.is_empty()).then_some(result.error),
            })
            .collect())
    }

    async fn estimate_gas(&self, bundle: &Bundle) -> Result<u64> {
        self.provider
            .estimate_gas(self.process_bundle_request(bundle))
            .await
            .map_err(|e| classify_rpc_error(e, RpcContext::Read))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider.get_gas_price().await.map_err(|e| classify_rpc_error(e, RpcContext::Read))
    }

    async fn account_nonce(&self) -> Result<u64> {
        self.provider
            .get_transaction_count(self.wallet_address)
            .pending()
            .await
            .map_err(|e| classify_rpc_error(e, RpcContext::Read))
    }

    async fn submit(&self, bundle: &Bundle, nonce: u64) -> Result<B256> {
        let request = self.process_bundle_request(bundle);

        let gas_estimate = self
            .provider
            .estimate_gas(request.clone())
            .await
            .map_err(|e| classify_rpc_error(e, RpcContext::Send))?;
        let fees = self.provider.estimate_eip1559_fees().await.map_err(|e| classify_rpc_error(e, RpcContext::Read))?;
        let chain_id = self.provider.get_chain_id().await.map_err(|e| classify_rpc_error(e, RpcContext::Read))?;

        let envelope = request
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(gas_estimate.saturating_mul(GAS_LIMIT_MARGIN_PERCENT) / 100)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .build(&self.wallet)
            .await
            .map_err(|e| ExecutionClientError::Internal(Box::new(e)))?;
        let tx_hash = *envelope.tx_hash();

        debug!(tx_hash = %tx_hash, nonce, operations = bundle.operation_count(), "Sending aggregate bundle");

        match self.provider.send_raw_transaction(&envelope.encoded_2718()).await {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(e) if is_already_known(&e) => {
                warn!(tx_hash = %tx_hash, "Transaction already known to the node");
                Ok(tx_hash)
            }
            Err(e) => Err(classify_rpc_error(e, RpcContext::Send)),
        }
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<SubmissionReceipt> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| classify_rpc_error(e, RpcContext::Read))?;

            if let Some(receipt) = receipt {
                return Ok(SubmissionReceipt {
                    transaction_hash: receipt.transaction_hash,
                    block_number: receipt.block_number.unwrap_or_default(),
                    gas_used: receipt.gas_used,
                    success: receipt.status(),
                });
            }

            if Instant::now() >= deadline {
                return Err(ExecutionClientError::InclusionFailed(tx_hash));
            }
            sleep(self.receipt_poll_interval).await;
        }
    }
}
