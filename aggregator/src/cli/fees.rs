use clap::{ArgAction, Args};

/// Parameters used to price bundles.
#[derive(Debug, Clone, Args)]
pub struct FeeCliArgs {
    /// Token fees are paid in: `ether`, or `token:<address>`.
    #[arg(env = "AGGREGATOR_FEE_TYPE", long, default_value = "ether")]
    pub fee_type: String,

    /// Token units worth one wei. Required when fees are paid in a token.
    #[arg(env = "AGGREGATOR_FEE_ETH_VALUE_IN_TOKEN", long)]
    pub fee_eth_value_in_token: Option<String>,

    /// Wei charged per unit of gas.
    #[arg(env = "AGGREGATOR_FEE_PER_GAS", long, default_value = "0")]
    pub fee_per_gas: u128,

    /// Wei charged per byte of calldata.
    #[arg(env = "AGGREGATOR_FEE_PER_BYTE", long, default_value = "0")]
    pub fee_per_byte: u128,

    /// Submit aggregates even when their fees do not cover the expected cost.
    #[arg(env = "AGGREGATOR_FEE_ALLOW_LOSSES", long, default_value_t = true, action = ArgAction::Set)]
    pub fee_allow_losses: bool,

    /// Operation count from which an aggregate is expected to pay for its overhead.
    #[arg(env = "AGGREGATOR_FEE_BREAKEVEN_OPERATION_COUNT", long, default_value = "1")]
    pub fee_breakeven_operation_count: usize,

    /// Simulate bundles at admission and reject those paying less than required.
    #[arg(env = "AGGREGATOR_ADMISSION_FEE_CHECK", long, default_value_t = false, action = ArgAction::Set)]
    pub admission_fee_check: bool,
}
