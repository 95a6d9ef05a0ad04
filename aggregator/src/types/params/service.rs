use crate::strategy::FeePolicy;
use crate::types::params::{BatchingParams, SubmissionParams};

/// Everything the aggregator service needs besides its clients.
#[derive(Debug, Clone, Default)]
pub struct ServiceParams {
    pub batching: BatchingParams,
    pub submission: SubmissionParams,
    pub fees: FeePolicy,
}
