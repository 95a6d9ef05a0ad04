use alloy_primitives::Address;
use clap::Args;
use url::Url;

/// Parameters used to connect to the execution chain.
#[derive(Debug, Clone, Args)]
pub struct EthereumCliArgs {
    /// The RPC URL of the chain bundles are submitted to.
    #[arg(env = "AGGREGATOR_ETHEREUM_RPC_URL", long)]
    pub ethereum_rpc_url: Url,

    /// The private key of the account paying for aggregate submissions.
    #[arg(env = "AGGREGATOR_ETHEREUM_PRIVATE_KEY", long, hide_env_values = true)]
    pub ethereum_private_key: String,

    /// Address of the gateway contract processing bundles.
    #[arg(env = "AGGREGATOR_GATEWAY_ADDRESS", long)]
    pub gateway_address: Address,

    /// Address of the contract used to simulate bundles.
    #[arg(env = "AGGREGATOR_SIMULATOR_ADDRESS", long)]
    pub simulator_address: Address,

    /// Interval between block number polls, in milliseconds.
    #[arg(env = "AGGREGATOR_ETHEREUM_BLOCK_POLL_INTERVAL_MS", long, default_value = "1000")]
    pub ethereum_block_poll_interval_ms: u64,

    /// Interval between receipt polls, in milliseconds.
    #[arg(env = "AGGREGATOR_ETHEREUM_RECEIPT_POLL_INTERVAL_MS", long, default_value = "1000")]
    pub ethereum_receipt_poll_interval_ms: u64,

    /// Time to wait for a transaction to be mined, in seconds.
    #[arg(env = "AGGREGATOR_ETHEREUM_RECEIPT_TIMEOUT_SECS", long, default_value = "300")]
    pub ethereum_receipt_timeout_secs: u64,
}
