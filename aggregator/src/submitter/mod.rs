//! Sends aggregate bundles and retries transient failures.

use std::sync::Arc;
use std::time::Duration;

use aggregator_bundle::Bundle;
use aggregator_execution_client_interface::{ExecutionClient, ExecutionClientError, SubmissionReceipt};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Submission failed after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },

    #[error("Submission failed: {0}")]
    Fatal(#[source] ExecutionClientError),
}

/// Submits aggregates from the aggregator's own account, tracking its nonce locally.
pub struct ChainSubmitter {
    execution: Arc<dyn ExecutionClient>,
    next_nonce: Mutex<u64>,
}

impl ChainSubmitter {
    /// Seeds the nonce counter from the chain.
    pub async fn new(execution: Arc<dyn ExecutionClient>) -> Result<Self, ExecutionClientError> {
        let nonce = execution.account_nonce().await?;
        info!(nonce, "Chain submitter initialised");
        Ok(Self { execution, next_nonce: Mutex::new(nonce) })
    }

    pub async fn next_nonce(&self) -> u64 {
        *self.next_nonce.lock().await
    }

    /// Sends `bundle` and waits for it to be mined successfully.
    ///
    /// A "nonce not yet valid" rejection and any failure while waiting for the receipt are
    /// retried after `retry_delay`, up to `max_attempts` attempts in total. A reverted
    /// transaction consumed its nonce, so the next attempt gets a fresh one. Every other
    /// send error is fatal and re-seeds the nonce counter from the chain.
    pub async fn submit(
        &self,
        bundle: &Bundle,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let max_attempts = max_attempts.max(1);
        let mut nonce = self.allocate_nonce().await;
        let mut needs_fresh_nonce = false;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            // A reverted attempt consumed its nonce on chain.
            if needs_fresh_nonce {
                nonce = self.allocate_nonce().await;
                needs_fresh_nonce = false;
            }
            debug!(attempt, nonce, "Submitting aggregate");

            match self.execution.submit(bundle, nonce).await {
                Ok(tx_hash) => match self.execution.wait_for_receipt(tx_hash).await {
                    Ok(receipt) if receipt.success => {
                        info!(
                            tx_hash = %receipt.transaction_hash,
                            block_number = receipt.block_number,
                            gas_used = receipt.gas_used,
                            attempt,
                            "Aggregate confirmed"
                        );
                        return Ok(receipt);
                    }
                    Ok(receipt) => {
                        warn!(tx_hash = %receipt.transaction_hash, attempt, "Aggregate reverted");
                        last_error = format!("transaction {} reverted", receipt.transaction_hash);
                        needs_fresh_nonce = true;
                    }
                    Err(e) if e.is_inclusion_failure() => {
                        warn!(tx_hash = %tx_hash, attempt, "Aggregate not included in time");
                        last_error = e.to_string();
                    }
                    Err(e) => {
                        warn!(tx_hash = %tx_hash, attempt, error = %e, "Waiting for aggregate failed");
                        last_error = e.to_string();
                    }
                },
                Err(e) if e.is_nonce_not_yet_valid() => {
                    warn!(nonce, attempt, error = %e, "Nonce not yet valid, retrying");
                    last_error = e.to_string();
                }
                Err(e) => {
                    error!(nonce, attempt, error = %e, "Aggregate submission failed");
                    self.resync_nonce().await;
                    return Err(SubmissionError::Fatal(e));
                }
            }

            if attempt < max_attempts {
                sleep(retry_delay).await;
            }
        }

        Err(SubmissionError::AttemptsExhausted { attempts: max_attempts, last_error })
    }

    async fn allocate_nonce(&self) -> u64 {
        let mut next = self.next_nonce.lock().await;
        let nonce = *next;
        *next += 1;
        nonce
    }

    async fn resync_nonce(&self) {
        match self.execution.account_nonce().await {
            Ok(nonce) => {
                debug!(nonce, "Nonce counter re-seeded from chain");
                *self.next_nonce.lock().await = nonce;
            }
            Err(e) => warn!(error = %e, "Could not re-seed nonce counter"),
        }
    }
}
