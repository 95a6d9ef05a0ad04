use std::str::FromStr;

use alloy_primitives::{Address, U256};
use bigdecimal::{BigDecimal, Zero};

use crate::cli::fees::FeeCliArgs;
use crate::error::AggregatorError;
use crate::strategy::{FeePolicy, FeeToken};

const TOKEN_PREFIX: &str = "token:";

impl TryFrom<FeeCliArgs> for FeePolicy {
    type Error = AggregatorError;

    fn try_from(args: FeeCliArgs) -> Result<Self, Self::Error> {
        let token = if args.fee_type == "ether" {
            FeeToken::Ether
        } else if let Some(address) = args.fee_type.strip_prefix(TOKEN_PREFIX) {
            let address = Address::from_str(address)
                .map_err(|e| AggregatorError::ConfigError(format!("Invalid fee token address {address}: {e}")))?;
            let ratio = args.fee_eth_value_in_token.as_deref().ok_or_else(|| {
                AggregatorError::ConfigError("Fee eth value in token is required for token fees".to_string())
            })?;
            let eth_value_in_token = BigDecimal::from_str(ratio)
                .map_err(|e| AggregatorError::ConfigError(format!("Invalid fee eth value in token {ratio}: {e}")))?;
            if eth_value_in_token <= BigDecimal::zero() {
                return Err(AggregatorError::ConfigError("Fee eth value in token must be positive".to_string()));
            }
            FeeToken::Token { address, eth_value_in_token }
        } else {
            return Err(AggregatorError::ConfigError(format!(
                "Invalid fee type {}, expected `ether` or `token:<address>`",
                args.fee_type
            )));
        };

        Ok(Self {
            token,
            per_gas: U256::from(args.fee_per_gas),
            per_byte: U256::from(args.fee_per_byte),
            allow_losses: args.fee_allow_losses,
            breakeven_operation_count: args.fee_breakeven_operation_count,
            check_on_admission: args.admission_fee_check,
        })
    }
}
