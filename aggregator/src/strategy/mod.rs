//! Batch formation: picks, prices and combines eligible bundles into one aggregate.

mod conflict;
pub mod fees;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use aggregator_bundle::Bundle;
use aggregator_execution_client_interface::{BundleSimulation, ExecutionClient};
use aggregator_signer_interface::BundleSigner;
use alloy_primitives::{I256, U256};
use futures::future::try_join_all;
use rand::seq::SliceRandom;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{AggregatorError, AggregatorResult};
use crate::queue::BundleRow;
use crate::strategy::conflict::{conflict_losers, contested_groups};
pub use crate::strategy::fees::{FeePolicy, FeeToken};

#[derive(Debug, Clone)]
pub struct FailedRow {
    pub row: BundleRow,
    pub reason: String,
}

/// Result of one strategy run. Rows that are neither included nor failed stay pending
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub aggregate: Option<Bundle>,
    pub included_rows: Vec<BundleRow>,
    pub expected_fee: U256,
    pub expected_max_cost: U256,
    pub failed_rows: Vec<FailedRow>,
}

pub struct AggregationStrategy {
    execution: Arc<dyn ExecutionClient>,
    signer: Arc<dyn BundleSigner>,
    fees: FeePolicy,
    max_aggregation_size: usize,
    limiter: Semaphore,
}

impl AggregationStrategy {
    pub fn new(
        execution: Arc<dyn ExecutionClient>,
        signer: Arc<dyn BundleSigner>,
        fees: FeePolicy,
        max_aggregation_size: usize,
        simulation_concurrency: usize,
    ) -> Self {
        Self { execution, signer, fees, max_aggregation_size, limiter: Semaphore::new(simulation_concurrency.max(1)) }
    }

    pub fn fees(&self) -> &FeePolicy {
        &self.fees
    }

    /// Builds at most one aggregate out of `rows`, which must be in FIFO order.
    pub async fn run(&self, rows: Vec<BundleRow>) -> AggregatorResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        if rows.is_empty() {
            return Ok(outcome);
        }

        let overhead = self.measure_overhead().await?;
        let rows = self.resolve_conflicts(rows, overhead).await?;
        debug!(rows = rows.len(), overhead_gas = overhead, "Forming aggregate");

        let mut remaining: VecDeque<BundleRow> = rows.into();
        let mut included_bundles: Vec<Bundle> = Vec::new();
        let mut aggregate: Option<Bundle> = None;
        let mut used_actions = 0;
        let mut collected = U256::ZERO;

        loop {
            while remaining.front().is_some_and(|row| row.bundle.action_count() > self.max_aggregation_size) {
                if let Some(row) = remaining.pop_front() {
                    let reason = format!(
                        "bundle has {} actions, more than the aggregation limit of {}",
                        row.bundle.action_count(),
                        self.max_aggregation_size
                    );
                    outcome.failed_rows.push(FailedRow { row, reason });
                }
            }

            let candidates = take_fitting(&mut remaining, self.max_aggregation_size.saturating_sub(used_actions));
            if candidates.is_empty() {
                break;
            }

            let required =
                try_join_all(candidates.iter().map(|row| self.required_fee(&row.bundle, overhead))).await?;
            let simulations =
                try_join_all(candidates.iter().map(|row| self.simulate_candidate(aggregate.as_ref(), &row.bundle)))
                    .await?;

            let mut accepted = false;
            for ((row, required_fee), simulation) in candidates.into_iter().zip(required).zip(simulations) {
                if !simulation.any_operation_succeeded() {
                    let reason = simulation.error.unwrap_or_else(|| "no operation succeeded".to_string());
                    outcome.failed_rows.push(FailedRow { row, reason });
                } else if simulation.fee < required_fee {
                    let reason = format!("insufficient fee: paid {}, required {required_fee}", simulation.fee);
                    outcome.failed_rows.push(FailedRow { row, reason });
                } else {
                    used_actions += row.bundle.action_count();
                    collected = collected.saturating_add(simulation.fee);
                    included_bundles.push(row.bundle.clone());
                    outcome.included_rows.push(row);
                    accepted = true;
                }
            }

            if accepted {
                aggregate = Some(self.signer.aggregate(&included_bundles).await?);
            }
        }

        let Some(aggregate) = aggregate else {
            return Ok(outcome);
        };

        let gas = self.execution.estimate_gas(&aggregate).await?;
        let gas_price = self.execution.gas_price().await?;
        outcome.expected_max_cost = self.fees.max_cost(gas, gas_price)?;
        outcome.expected_fee = collected;

        if !self.fees.allow_losses {
            let simulation = self.simulate(std::slice::from_ref(&aggregate)).await?;
            outcome.expected_fee = simulation.first().map(|s| s.fee).unwrap_or_default();

            if outcome.expected_fee < outcome.expected_max_cost {
                return Ok(self.reject_unprofitable(outcome, aggregate.operation_count()));
            }
        }

        info!(
            rows = outcome.included_rows.len(),
            actions = used_actions,
            expected_fee = %outcome.expected_fee,
            expected_max_cost = %outcome.expected_max_cost,
            "Aggregate formed"
        );
        outcome.aggregate = Some(aggregate);
        Ok(outcome)
    }

    /// Fee `bundle` must pay: its own gas beyond the fixed overhead, a share of that
    /// overhead, and its calldata.
    pub async fn required_fee(&self, bundle: &Bundle, overhead_gas: u64) -> AggregatorResult<U256> {
        let gas = {
            let _permit = self.limiter.acquire().await?;
            self.execution.estimate_gas(bundle).await?
        };
        let marginal = gas.saturating_sub(overhead_gas);
        let charged = marginal.saturating_add(self.fees.overhead_share(overhead_gas, bundle.operation_count()));
        self.fees.required_fee(charged, bundle.abi_encoded_size())
    }

    /// Fixed gas cost of processing a bundle, extrapolated from a one and a two operation
    /// probe: `2·g1 − g2`.
    async fn measure_overhead(&self) -> AggregatorResult<u64> {
        let (one, two) = tokio::try_join!(self.signer.probe_bundle(1), self.signer.probe_bundle(2))?;
        let (g1, g2) = tokio::try_join!(self.execution.estimate_gas(&one), self.execution.estimate_gas(&two))?;
        Ok(g1.saturating_mul(2).saturating_sub(g2))
    }

    /// Drops every row that loses a `(sender, nonce)` conflict. Losers stay pending.
    async fn resolve_conflicts(&self, rows: Vec<BundleRow>, overhead: u64) -> AggregatorResult<Vec<BundleRow>> {
        let groups = contested_groups(&rows);
        if groups.is_empty() {
            return Ok(rows);
        }

        let mut contested: Vec<usize> = groups.iter().flatten().copied().collect();
        contested.sort_unstable();
        contested.dedup();

        let margins = try_join_all(contested.iter().map(|index| self.margin(&rows[*index].bundle, overhead))).await?;
        let margins: HashMap<usize, I256> = contested.into_iter().zip(margins).collect();
        let losers = conflict_losers(&rows, &groups, &margins);

        for index in &losers {
            debug!(row_id = rows[*index].id, "Row lost a nonce conflict, deferring");
        }

        Ok(rows.into_iter().enumerate().filter(|(index, _)| !losers.contains(index)).map(|(_, row)| row).collect())
    }

    async fn margin(&self, bundle: &Bundle, overhead: u64) -> AggregatorResult<I256> {
        let required = self.required_fee(bundle, overhead).await?;
        let simulation = self.simulate(std::slice::from_ref(bundle)).await?;
        match simulation.first() {
            Some(simulation) if simulation.any_operation_succeeded() => {
                Ok(to_signed(simulation.fee).saturating_sub(to_signed(required)))
            }
            _ => Ok(I256::MIN),
        }
    }

    /// Simulates `candidate` alone on top of the accepted aggregate.
    async fn simulate_candidate(
        &self,
        aggregate: Option<&Bundle>,
        candidate: &Bundle,
    ) -> AggregatorResult<BundleSimulation> {
        let mut batch = Vec::with_capacity(2);
        batch.extend(aggregate.cloned());
        batch.push(candidate.clone());
        let expected = batch.len();
        let mut simulations = self.simulate(&batch).await?;
        simulations.pop().ok_or(AggregatorError::SimulationMismatch { expected, got: 0 })
    }

    async fn simulate(&self, bundles: &[Bundle]) -> AggregatorResult<Vec<BundleSimulation>> {
        let _permit = self.limiter.acquire().await?;
        let simulations = self.execution.simulate(bundles).await?;
        if simulations.len() != bundles.len() {
            return Err(AggregatorError::SimulationMismatch { expected: bundles.len(), got: simulations.len() });
        }
        Ok(simulations)
    }

    fn reject_unprofitable(&self, mut outcome: BatchOutcome, operation_count: usize) -> BatchOutcome {
        let included = std::mem::take(&mut outcome.included_rows);

        if operation_count < self.fees.breakeven_operation_count {
            debug!(
                operations = operation_count,
                breakeven = self.fees.breakeven_operation_count,
                "Aggregate below breakeven size, waiting for more bundles"
            );
            return outcome;
        }

        warn!(
            rows = included.len(),
            expected_fee = %outcome.expected_fee,
            expected_max_cost = %outcome.expected_max_cost,
            "Aggregate would not cover its cost, failing half of it"
        );

        let mut order: Vec<usize> = (0..included.len()).collect();
        order.shuffle(&mut rand::thread_rng());
        order.truncate(included.len().div_ceil(2));

        for (index, row) in included.into_iter().enumerate() {
            if order.contains(&index) {
                outcome.failed_rows.push(FailedRow { row, reason: "aggregate would not cover its cost".to_string() });
            }
        }
        outcome
    }
}

fn take_fitting(remaining: &mut VecDeque<BundleRow>, capacity: usize) -> Vec<BundleRow> {
    let mut taken = Vec::new();
    let mut actions = 0;
    while let Some(row) = remaining.front() {
        let needed = row.bundle.action_count();
        if actions + needed > capacity {
            break;
        }
        actions += needed;
        taken.extend(remaining.pop_front());
    }
    taken
}

fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}
