pub mod fakes;

use std::sync::Arc;
use std::time::Duration;

use aggregator_bundle::{Action, Bundle, Operation, PublicKey};
use alloy_primitives::{Address, Bytes, U256};
use rstest::*;

use crate::queue::{BundleRow, BundleStatus, BundleTable};
use crate::service::AggregatorService;
use crate::strategy::FeePolicy;
use crate::tests::common::fakes::{FakeChain, FakeSigner};
use crate::types::params::{BatchingParams, ServiceParams, SubmissionParams};

/// Signature word the fake signer refuses to verify.
pub const BAD_SIGNATURE: u64 = 0xbad;

pub fn key(seed: u64) -> PublicKey {
    [U256::from(seed); 4]
}

/// A single-operation bundle from `sender` carrying one action worth `fee`.
pub fn bundle(sender: u64, nonce: u64, fee: u64) -> Bundle {
    bundle_with_actions(sender, nonce, 1, fee)
}

/// A single-operation bundle with `actions` actions. The first action carries the fee.
pub fn bundle_with_actions(sender: u64, nonce: u64, actions: usize, fee: u64) -> Bundle {
    let actions = (0..actions)
        .map(|index| Action {
            value: if index == 0 { U256::from(fee) } else { U256::ZERO },
            target: Address::with_last_byte(index as u8 + 1),
            call_data: Bytes::new(),
        })
        .collect();
    Bundle {
        sender_public_keys: vec![key(sender)],
        operations: vec![Operation { nonce: U256::from(nonce), actions }],
        signature: [U256::from(1), U256::from(sender)],
    }
}

/// Makes otherwise identical bundles distinct.
pub fn tagged(mut bundle: Bundle, tag: u8) -> Bundle {
    if let Some(action) = bundle.operations.first_mut().and_then(|op| op.actions.first_mut()) {
        action.call_data = Bytes::from(vec![tag]);
    }
    bundle
}

pub fn row(id: i64, bundle: Bundle) -> BundleRow {
    BundleRow {
        id,
        status: BundleStatus::Pending,
        hash: bundle.content_hash(),
        bundle,
        eligible_after: 0,
        next_eligibility_delay: 1,
        submit_error: None,
        receipt: None,
    }
}

#[fixture]
pub fn table() -> BundleTable {
    BundleTable::in_memory().expect("in-memory table")
}

#[fixture]
pub fn chain() -> Arc<FakeChain> {
    Arc::new(FakeChain::default())
}

#[fixture]
pub fn signer() -> Arc<FakeSigner> {
    Arc::new(FakeSigner)
}

pub struct TestService {
    pub service: AggregatorService,
    pub chain: Arc<FakeChain>,
    pub table: BundleTable,
}

/// Builds an [`AggregatorService`] on top of the in-process fakes.
pub struct TestServiceBuilder {
    params: ServiceParams,
    chain: Arc<FakeChain>,
}

impl Default for TestServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServiceBuilder {
    pub fn new() -> Self {
        let batching = BatchingParams {
            max_aggregation_size: 5,
            max_aggregation_delay: Duration::from_secs(3600),
            backpressure_poll_interval: Duration::from_millis(10),
            ..BatchingParams::default()
        };
        let submission = SubmissionParams { max_attempts: 3, retry_delay: Duration::from_millis(1) };
        Self {
            params: ServiceParams { batching, submission, fees: FeePolicy::default() },
            chain: Arc::new(FakeChain::default()),
        }
    }

    pub fn batching(mut self, configure: impl FnOnce(&mut BatchingParams)) -> Self {
        configure(&mut self.params.batching);
        self
    }

    pub fn submission(mut self, configure: impl FnOnce(&mut SubmissionParams)) -> Self {
        configure(&mut self.params.submission);
        self
    }

    pub fn fees(mut self, fees: FeePolicy) -> Self {
        self.params.fees = fees;
        self
    }

    pub fn chain(mut self, chain: FakeChain) -> Self {
        self.chain = Arc::new(chain);
        self
    }

    pub async fn build(self) -> TestService {
        let table = BundleTable::in_memory().expect("in-memory table");
        let service =
            AggregatorService::new(self.params, table.clone(), self.chain.clone(), Arc::new(FakeSigner))
                .await
                .expect("service starts");
        TestService { service, chain: self.chain, table }
    }
}
