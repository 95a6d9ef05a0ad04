use std::str::FromStr;

use alloy_primitives::{Address, U256};
use bigdecimal::{BigDecimal, RoundingMode};

use crate::error::{AggregatorError, AggregatorResult};

#[derive(Debug, Clone, PartialEq)]
pub enum FeeToken {
    Ether,
    /// `eth_value_in_token` is the number of token units worth one wei.
    Token { address: Address, eth_value_in_token: BigDecimal },
}

impl FeeToken {
    pub fn address(&self) -> Address {
        match self {
            FeeToken::Ether => Address::ZERO,
            FeeToken::Token { address, .. } => *address,
        }
    }
}

/// Pricing rules a bundle has to satisfy to be worth including.
#[derive(Debug, Clone, PartialEq)]
pub struct FeePolicy {
    pub token: FeeToken,
    /// Wei charged per unit of gas.
    pub per_gas: U256,
    /// Wei charged per byte of bundle calldata.
    pub per_byte: U256,
    pub allow_losses: bool,
    pub breakeven_operation_count: usize,
    /// Also reject underpaying bundles at admission time.
    pub check_on_admission: bool,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            token: FeeToken::Ether,
            per_gas: U256::ZERO,
            per_byte: U256::ZERO,
            allow_losses: true,
            breakeven_operation_count: 1,
            check_on_admission: false,
        }
    }
}

impl FeePolicy {
    /// Fee a bundle must pay, in fee-token units, for `gas` gas and `calldata_bytes` bytes.
    pub fn required_fee(&self, gas: u64, calldata_bytes: usize) -> AggregatorResult<U256> {
        let wei = U256::from(gas)
            .saturating_mul(self.per_gas)
            .saturating_add(U256::from(calldata_bytes).saturating_mul(self.per_byte));
        self.to_fee_units(wei)
    }

    /// Worst-case cost of sending an aggregate, in fee-token units.
    pub fn max_cost(&self, gas: u64, gas_price: u128) -> AggregatorResult<U256> {
        self.to_fee_units(U256::from(gas).saturating_mul(U256::from(gas_price)))
    }

    /// Share of the fixed bundle overhead charged to a bundle with `operation_count`
    /// operations. The full overhead is covered once the aggregate reaches the breakeven size.
    pub fn overhead_share(&self, overhead_gas: u64, operation_count: usize) -> u64 {
        let breakeven = self.breakeven_operation_count.max(1) as u128;
        let share = (overhead_gas as u128 * operation_count as u128).div_ceil(breakeven);
        share.min(overhead_gas as u128) as u64
    }

    /// Converts wei into fee-token units, always rounding up.
    pub fn to_fee_units(&self, wei: U256) -> AggregatorResult<U256> {
        let ratio = match &self.token {
            FeeToken::Ether => return Ok(wei),
            FeeToken::Token { eth_value_in_token, .. } => eth_value_in_token,
        };

        let wei = BigDecimal::from_str(&wei.to_string())
            .map_err(|e| AggregatorError::FeeConversionError(format!("{wei}: {e}")))?;
        let (units, _) = (wei * ratio).with_scale_round(0, RoundingMode::Ceiling).into_bigint_and_exponent();
        U256::from_str_radix(&units.to_string(), 10).map_err(|e| AggregatorError::FeeConversionError(e.to_string()))
    }
}
