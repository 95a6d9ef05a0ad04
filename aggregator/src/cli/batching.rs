use clap::{ArgAction, Args};

/// Parameters used to configure aggregation.
#[derive(Debug, Clone, Args)]
pub struct BatchingCliArgs {
    /// Maximum number of actions in one aggregate bundle.
    #[arg(env = "AGGREGATOR_MAX_AGGREGATION_SIZE", long, default_value = "12")]
    pub max_aggregation_size: usize,

    /// Longest time pending bundles wait before a submission is attempted, in milliseconds.
    #[arg(env = "AGGREGATOR_MAX_AGGREGATION_DELAY_MS", long, default_value = "5000")]
    pub max_aggregation_delay_ms: u64,

    /// Number of aggregates that may be awaiting confirmation at the same time.
    #[arg(env = "AGGREGATOR_MAX_UNCONFIRMED_AGGREGATIONS", long, default_value = "3")]
    pub max_unconfirmed_aggregations: usize,

    /// Largest eligibility delay, in blocks, a failing bundle can reach before it is dropped.
    #[arg(env = "AGGREGATOR_MAX_ELIGIBILITY_DELAY", long, default_value = "300")]
    pub max_eligibility_delay: u64,

    /// Number of simulations and gas estimations run in parallel.
    #[arg(env = "AGGREGATOR_SIMULATION_CONCURRENCY", long, default_value = "8")]
    pub simulation_concurrency: usize,

    /// Polling interval while waiting for in-flight capacity, in milliseconds.
    #[arg(env = "AGGREGATOR_BACKPRESSURE_POLL_INTERVAL_MS", long, default_value = "1000")]
    pub backpressure_poll_interval_ms: u64,

    /// Keep confirmed and dropped bundles in the table instead of deleting them.
    #[arg(env = "AGGREGATOR_RETAIN_HISTORY", long, default_value_t = false, action = ArgAction::Set)]
    pub retain_history: bool,
}
