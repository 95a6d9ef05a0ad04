use serde::Serialize;
use strum_macros::{AsRefStr, EnumIter};

/// Independent liveness probes reported by [`crate::service::AggregatorService::health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum HealthCheck {
    /// The bundle table accepts a query group.
    Database,
    /// The current block number can be fetched.
    ExecutionBackend,
    /// In-flight actions are below the backpressure ceiling.
    SubmissionCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub name: String,
    pub healthy: bool,
    pub detail: String,
}

impl HealthReport {
    pub(crate) fn healthy(check: HealthCheck, detail: impl Into<String>) -> Self {
        Self { name: check.as_ref().to_string(), healthy: true, detail: detail.into() }
    }

    pub(crate) fn unhealthy(check: HealthCheck, detail: impl Into<String>) -> Self {
        Self { name: check.as_ref().to_string(), healthy: false, detail: detail.into() }
    }
}
