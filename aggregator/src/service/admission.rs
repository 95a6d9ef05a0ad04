use std::collections::HashMap;

use aggregator_bundle::{Bundle, PublicKey};
use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use tracing::debug;

use crate::error::AggregatorResult;
use crate::service::ServiceInner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailureKind {
    InvalidFormat,
    InvalidSignature,
    DuplicateNonce,
    InsufficientFee,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFailure {
    pub kind: FailureKind,
    pub description: String,
}

impl AddFailure {
    fn new(kind: FailureKind, description: impl Into<String>) -> Self {
        Self { kind, description: description.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AddOutcome {
    Accepted { hash: B256 },
    Rejected { failures: Vec<AddFailure> },
}

impl AddOutcome {
    pub fn hash(&self) -> Option<B256> {
        match self {
            AddOutcome::Accepted { hash } => Some(*hash),
            AddOutcome::Rejected { .. } => None,
        }
    }
}

impl ServiceInner {
    /// Every reason `bundle` cannot be queued. A malformed bundle is not checked further.
    pub(super) async fn admission_failures(&self, bundle: &Bundle) -> AggregatorResult<Vec<AddFailure>> {
        if let Err(e) = bundle.check_well_formed() {
            return Ok(vec![AddFailure::new(FailureKind::InvalidFormat, e.to_string())]);
        }

        let mut failures = Vec::new();
        let max_actions = self.params.batching.max_aggregation_size;
        if bundle.action_count() > max_actions {
            failures.push(AddFailure::new(
                FailureKind::InvalidFormat,
                format!("bundle has {} actions, more than the limit of {max_actions}", bundle.action_count()),
            ));
        }

        if !self.signer.verify(bundle).await? {
            failures.push(AddFailure::new(FailureKind::InvalidSignature, "aggregate signature does not verify"));
        }

        let mut wallet_nonces: HashMap<PublicKey, U256> = HashMap::new();
        for (index, (key, operation)) in bundle.entries().enumerate() {
            let wallet_nonce = match wallet_nonces.get(key) {
                Some(nonce) => *nonce,
                None => {
                    let nonce = self.execution.wallet_nonce(key).await?;
                    wallet_nonces.insert(*key, nonce);
                    nonce
                }
            };
            if operation.nonce < wallet_nonce {
                failures.push(AddFailure::new(
                    FailureKind::DuplicateNonce,
                    format!(
                        "operation {index} uses nonce {}, but the wallet is already at nonce {wallet_nonce}",
                        operation.nonce
                    ),
                ));
            }
        }

        if self.strategy.fees().check_on_admission {
            let required = self.strategy.required_fee(bundle, 0).await?;
            let simulation = self.execution.simulate(std::slice::from_ref(bundle)).await?;
            let paid = simulation.first().map(|s| s.fee).unwrap_or_default();
            if paid < required {
                failures.push(AddFailure::new(
                    FailureKind::InsufficientFee,
                    format!("bundle pays {paid}, but {required} is required"),
                ));
            }
        }

        if !failures.is_empty() {
            debug!(failures = failures.len(), "Bundle failed admission");
        }
        Ok(failures)
    }
}
