use std::time::Duration;

use crate::cli::batching::BatchingCliArgs;
use crate::error::AggregatorError;

#[derive(Debug, Clone)]
pub struct BatchingParams {
    pub max_aggregation_size: usize,
    pub max_aggregation_delay: Duration,
    pub max_unconfirmed_aggregations: usize,
    pub max_eligibility_delay: u64,
    pub simulation_concurrency: usize,
    pub backpressure_poll_interval: Duration,
    pub retain_history: bool,
}

impl BatchingParams {
    /// Most actions allowed in aggregates awaiting confirmation at once.
    pub fn in_flight_action_limit(&self) -> usize {
        self.max_aggregation_size.saturating_mul(self.max_unconfirmed_aggregations)
    }
}

impl Default for BatchingParams {
    fn default() -> Self {
        Self {
            max_aggregation_size: 12,
            max_aggregation_delay: Duration::from_millis(5000),
            max_unconfirmed_aggregations: 3,
            max_eligibility_delay: 300,
            simulation_concurrency: 8,
            backpressure_poll_interval: Duration::from_millis(1000),
            retain_history: false,
        }
    }
}

impl TryFrom<BatchingCliArgs> for BatchingParams {
    type Error = AggregatorError;

    fn try_from(args: BatchingCliArgs) -> Result<Self, Self::Error> {
        if args.max_aggregation_size == 0 {
            return Err(AggregatorError::ConfigError("max aggregation size must be at least 1".to_string()));
        }
        if args.max_unconfirmed_aggregations == 0 {
            return Err(AggregatorError::ConfigError("max unconfirmed aggregations must be at least 1".to_string()));
        }
        Ok(Self {
            max_aggregation_size: args.max_aggregation_size,
            max_aggregation_delay: Duration::from_millis(args.max_aggregation_delay_ms),
            max_unconfirmed_aggregations: args.max_unconfirmed_aggregations,
            max_eligibility_delay: args.max_eligibility_delay,
            simulation_concurrency: args.simulation_concurrency.max(1),
            backpressure_poll_interval: Duration::from_millis(args.backpressure_poll_interval_ms),
            retain_history: args.retain_history,
        })
    }
}
