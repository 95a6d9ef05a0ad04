use std::time::Duration;

use aggregator_ethereum_execution_client::EthereumExecutionValidatedArgs;
use alloy_primitives::Address;

use crate::cli::RunCmd;

/// Builds the execution client arguments; `fee_token` comes from the fee policy so both agree.
pub fn ethereum_params(run_cmd: &RunCmd, fee_token: Address) -> EthereumExecutionValidatedArgs {
    let args = &run_cmd.ethereum_args;
    EthereumExecutionValidatedArgs {
        ethereum_rpc_url: args.ethereum_rpc_url.clone(),
        ethereum_private_key: args.ethereum_private_key.clone(),
        gateway_address: args.gateway_address,
        simulator_address: args.simulator_address,
        fee_token,
        block_poll_interval: Duration::from_millis(args.ethereum_block_poll_interval_ms),
        receipt_poll_interval: Duration::from_millis(args.ethereum_receipt_poll_interval_ms),
        receipt_timeout: Duration::from_secs(args.ethereum_receipt_timeout_secs),
    }
}
