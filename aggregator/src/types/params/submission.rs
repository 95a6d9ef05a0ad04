use std::time::Duration;

use crate::cli::submission::SubmissionCliArgs;

#[derive(Debug, Clone)]
pub struct SubmissionParams {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for SubmissionParams {
    fn default() -> Self {
        Self { max_attempts: 20, retry_delay: Duration::from_millis(300) }
    }
}

impl From<SubmissionCliArgs> for SubmissionParams {
    fn from(args: SubmissionCliArgs) -> Self {
        Self {
            max_attempts: args.max_submission_attempts.max(1),
            retry_delay: Duration::from_millis(args.submission_retry_delay_ms),
        }
    }
}
