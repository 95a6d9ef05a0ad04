use clap::Args;

/// Parameters used to configure on-chain submission retries.
#[derive(Debug, Clone, Args)]
pub struct SubmissionCliArgs {
    /// Attempts made for one aggregate before giving up.
    #[arg(env = "AGGREGATOR_MAX_SUBMISSION_ATTEMPTS", long, default_value = "20")]
    pub max_submission_attempts: u32,

    /// Delay between submission attempts, in milliseconds.
    #[arg(env = "AGGREGATOR_SUBMISSION_RETRY_DELAY_MS", long, default_value = "300")]
    pub submission_retry_delay_ms: u64,
}
