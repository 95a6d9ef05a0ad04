use std::error::Error;

use aggregator_bundle::Bundle;
use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Signer rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid signer response: {0}")]
    InvalidResponse(String),

    #[error("Internal signer error: {0}")]
    Internal(#[source] Box<dyn Error + Send + Sync>),
}

/// Trait for every BLS signing backend
#[automock]
#[async_trait]
pub trait BundleSigner: Send + Sync {
    /// Should check the aggregate signature of `bundle` against its sender keys.
    async fn verify(&self, bundle: &Bundle) -> Result<bool, SignerError>;

    /// Should combine independently signed bundles into one bundle with one aggregate
    /// signature. An empty input yields [`Bundle::empty`].
    async fn aggregate(&self, bundles: &[Bundle]) -> Result<Bundle, SignerError>;

    /// Should return a validly signed bundle made of `operation_count` operations with no
    /// actions. Used to measure the fixed gas cost of processing a bundle.
    async fn probe_bundle(&self, operation_count: usize) -> Result<Bundle, SignerError>;
}
