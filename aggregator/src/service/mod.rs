//! The aggregator service: admission, the block driven backlog loop and submission.

pub mod admission;
pub(crate) mod backoff;
pub mod health;
mod in_flight;

use std::sync::{Arc, Weak};
use std::time::Instant;

use aggregator_bundle::Bundle;
use aggregator_execution_client_interface::{ExecutionClient, SubmissionReceipt};
use aggregator_signer_interface::BundleSigner;
use alloy_primitives::B256;
use futures::{FutureExt, StreamExt};
use opentelemetry::KeyValue;
use strum::IntoEnumIterator;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

pub use crate::service::admission::{AddFailure, AddOutcome, FailureKind};
pub use crate::service::health::{HealthCheck, HealthReport};

use crate::error::{AggregatorError, AggregatorResult};
use crate::queue::{BundleRow, BundleStatus, BundleTable, NewBundleRow};
use crate::scheduler::{SubmissionCallback, SubmissionTimer};
use crate::service::backoff::{apply_backoff, BackoffOutcome};
use crate::service::in_flight::{InFlightGuard, InFlightTracker};
use crate::strategy::AggregationStrategy;
use crate::submitter::{ChainSubmitter, SubmissionError};
use crate::types::params::ServiceParams;
use crate::utils::metrics::AGGREGATOR_METRICS;

pub(crate) struct ServiceInner {
    params: ServiceParams,
    table: BundleTable,
    execution: Arc<dyn ExecutionClient>,
    signer: Arc<dyn BundleSigner>,
    strategy: AggregationStrategy,
    submitter: ChainSubmitter,
    timer: Arc<SubmissionTimer>,
    in_flight: InFlightTracker,
    settled: watch::Sender<u64>,
    tracker: TaskTracker,
    stopping: CancellationToken,
}

/// Accepts bundles into the queue and turns them into confirmed aggregate submissions.
#[derive(Clone)]
pub struct AggregatorService {
    inner: Arc<ServiceInner>,
}

impl AggregatorService {
    pub async fn new(
        params: ServiceParams,
        table: BundleTable,
        execution: Arc<dyn ExecutionClient>,
        signer: Arc<dyn BundleSigner>,
    ) -> AggregatorResult<Self> {
        let submitter = ChainSubmitter::new(Arc::clone(&execution)).await?;
        let strategy = AggregationStrategy::new(
            Arc::clone(&execution),
            Arc::clone(&signer),
            params.fees.clone(),
            params.batching.max_aggregation_size,
            params.batching.simulation_concurrency,
        );
        let tracker = TaskTracker::new();
        let stopping = CancellationToken::new();
        let (settled, _) = watch::channel(0);

        let inner = Arc::new_cyclic(|weak: &Weak<ServiceInner>| {
            let timer = SubmissionTimer::new(
                params.batching.max_aggregation_delay,
                submission_callback(weak.clone()),
                tracker.clone(),
                stopping.clone(),
            );
            ServiceInner {
                params,
                table,
                execution,
                signer,
                strategy,
                submitter,
                timer,
                in_flight: InFlightTracker::default(),
                settled,
                tracker,
                stopping,
            }
        });

        Ok(Self { inner })
    }

    /// Starts the background loop re-evaluating the backlog on every new block.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let mut blocks = inner.execution.block_stream();
        info!(category = "service", "Starting block loop");

        self.inner.tracker.spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = inner.stopping.cancelled() => break,
                        next = blocks.next() => match next {
                            Some(Ok(block)) => {
                                AGGREGATOR_METRICS.block_gauge.record(block, &[]);
                                if let Err(e) = inner.check_backlog(block).await {
                                    warn!(block, error = %e, "Backlog check failed");
                                }
                            }
                            Some(Err(e)) => warn!(error = %e, "Block stream error"),
                            None => {
                                warn!("Block stream ended, stopping block loop");
                                break;
                            }
                        },
                    }
                }
                debug!("Block loop stopped");
            }
            .instrument(info_span!("block_loop", stage = "blocks")),
        );
    }

    /// Validates `bundle` and queues it. An identical pending bundle is not queued twice.
    pub async fn add(&self, bundle: Bundle) -> AggregatorResult<AddOutcome> {
        let inner = &self.inner;
        if inner.stopping.is_cancelled() {
            return Err(AggregatorError::ShuttingDown);
        }

        let failures = inner.admission_failures(&bundle).await?;
        if !failures.is_empty() {
            for failure in &failures {
                AGGREGATOR_METRICS.bundles_rejected.add(1, &[KeyValue::new("kind", failure.kind.as_ref().to_string())]);
            }
            return Ok(AddOutcome::Rejected { failures });
        }

        let block = inner.execution.block_number().await?;
        let new_row = NewBundleRow::pending(bundle, block);
        let hash = new_row.hash;

        let mut group = inner.table.begin().await?;
        if let Some(existing) = group.find_by_hash(&hash)? {
            if existing.status == BundleStatus::Pending {
                group.commit()?;
                debug!(row_id = existing.id, hash = %hash, "Bundle already queued");
                return Ok(AddOutcome::Accepted { hash });
            }
        }
        let inserted = group.add(vec![new_row])?;
        group.commit()?;

        for row in &inserted {
            info!(row_id = row.id, hash = %row.hash, actions = row.bundle.action_count(), "Bundle queued");
        }
        AGGREGATOR_METRICS.bundles_accepted.add(1, &[]);
        inner.spawn_backlog_check(Some(block));
        Ok(AddOutcome::Accepted { hash })
    }

    pub async fn pending_count(&self) -> AggregatorResult<usize> {
        let group = self.inner.table.begin().await?;
        let count = group.count_with_status(BundleStatus::Pending)?;
        group.commit()?;
        Ok(count)
    }

    pub async fn all_rows(&self) -> AggregatorResult<Vec<BundleRow>> {
        let group = self.inner.table.begin().await?;
        let rows = group.all()?;
        group.commit()?;
        Ok(rows)
    }

    /// Row stored under `hash`, preferring a pending one.
    pub async fn lookup(&self, hash: &B256) -> AggregatorResult<Option<BundleRow>> {
        let group = self.inner.table.begin().await?;
        let row = group.find_by_hash(hash)?;
        group.commit()?;
        Ok(row)
    }

    /// Deletes every row that is not part of an outstanding aggregate. Returns the
    /// number of rows removed.
    pub async fn reset(&self) -> AggregatorResult<usize> {
        let inner = &self.inner;
        let mut group = inner.table.begin().await?;
        let excluded = inner.in_flight.excluded_ids();
        let ids: Vec<i64> = group.all()?.into_iter().map(|row| row.id).filter(|id| !excluded.contains(id)).collect();
        let removed = group.remove(&ids)?;
        group.commit()?;
        inner.timer.clear();
        info!(removed, kept = excluded.len(), "Queue reset");
        Ok(removed)
    }

    pub async fn health(&self) -> Vec<HealthReport> {
        let mut reports = Vec::new();
        for check in HealthCheck::iter() {
            reports.push(self.inner.run_health_check(check).await);
        }
        reports
    }

    /// Runs a submission attempt now instead of waiting for the timer.
    pub async fn submit_now(&self) {
        self.inner.timer.trigger().await;
    }

    pub async fn wait_for_completed_submissions(&self, count: u64) {
        self.inner.timer.wait_for_completed_submissions(count).await;
    }

    pub fn settled_aggregations(&self) -> u64 {
        *self.inner.settled.borrow()
    }

    /// Resolves once `count` aggregates have been confirmed or requeued.
    pub async fn wait_for_settled_aggregations(&self, count: u64) {
        let mut receiver = self.inner.settled.subscribe();
        let _ = receiver.wait_for(|settled| *settled >= count).await;
    }

    pub fn in_flight_actions(&self) -> usize {
        self.inner.in_flight.actions()
    }

    /// Refuses new work and waits for every background task, including outstanding
    /// confirmations, to finish.
    pub async fn stop(&self) {
        info!(category = "service", "Stopping aggregator service");
        self.inner.stopping.cancel();
        self.inner.timer.clear();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!(category = "service", "Aggregator service stopped");
    }
}

fn submission_callback(service: Weak<ServiceInner>) -> SubmissionCallback {
    Arc::new(move || {
        let service = service.clone();
        async move {
            let Some(inner) = service.upgrade() else { return };
            if let Err(e) = inner.run_submission().instrument(info_span!("submission", stage = "submit")).await {
                error!(error = %e, error_chain = ?e, "Submission attempt failed");
            }
        }
        .boxed()
    })
}

impl ServiceInner {
    fn spawn_backlog_check(self: &Arc<Self>, block: Option<u64>) {
        if self.stopping.is_cancelled() {
            return;
        }
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            let block = match block {
                Some(block) => block,
                None => match inner.execution.block_number().await {
                    Ok(block) => block,
                    Err(e) => {
                        warn!(error = %e, "Could not fetch block for backlog check");
                        return;
                    }
                },
            };
            if let Err(e) = inner.check_backlog(block).await {
                warn!(block, error = %e, "Backlog check failed");
            }
        });
    }

    /// Decides whether the eligible backlog warrants an immediate submission, a
    /// delayed one, or none.
    async fn check_backlog(self: &Arc<Self>, block: u64) -> AggregatorResult<()> {
        if self.stopping.is_cancelled() {
            return Ok(());
        }

        let group = self.table.begin().await?;
        let counts = group.eligible_action_counts(block)?;
        group.commit()?;

        let excluded = self.in_flight.excluded_ids();
        let pending_actions: usize =
            counts.iter().filter(|(id, _)| !excluded.contains(id)).map(|(_, actions)| actions).sum();
        debug!(block, pending_actions, "Backlog checked");

        if pending_actions >= self.params.batching.max_aggregation_size {
            if !self.timer.trigger_soon() {
                debug!(pending_actions, "Submission already running");
            }
        } else if pending_actions > 0 {
            self.timer.notify_active();
        } else {
            self.timer.clear();
        }
        Ok(())
    }

    /// Forms one aggregate from the eligible rows and hands it to a confirmation task.
    async fn run_submission(self: &Arc<Self>) -> AggregatorResult<()> {
        if self.stopping.is_cancelled() {
            return Ok(());
        }
        let batching = &self.params.batching;
        let block = self.execution.block_number().await?;

        let mut group = self.table.begin().await?;
        let excluded = self.in_flight.excluded_ids();
        let rows: Vec<BundleRow> = group
            .find_eligible(block, batching.max_aggregation_size.saturating_add(excluded.len()))?
            .into_iter()
            .filter(|row| !excluded.contains(&row.id))
            .collect();
        if rows.is_empty() {
            group.commit()?;
            return Ok(());
        }

        let outcome = self.strategy.run(rows).await?;
        for failed in outcome.failed_rows {
            apply_backoff(
                &mut group,
                failed.row,
                &failed.reason,
                block,
                batching.max_eligibility_delay,
                batching.retain_history,
            )?;
        }

        let Some(aggregate) = outcome.aggregate else {
            group.commit()?;
            return Ok(());
        };

        let actions = aggregate.action_count();
        self.wait_for_capacity(actions).await?;
        let guard = self.in_flight.register(outcome.included_rows.iter().map(|row| row.id).collect(), actions);
        group.commit()?;

        info!(
            rows = outcome.included_rows.len(),
            actions,
            expected_fee = %outcome.expected_fee,
            expected_max_cost = %outcome.expected_max_cost,
            "Aggregate handed to submitter"
        );
        AGGREGATOR_METRICS.aggregates_submitted.add(1, &[]);
        AGGREGATOR_METRICS.aggregate_actions.record(actions as u64, &[]);

        let inner = Arc::clone(self);
        let rows = outcome.included_rows;
        self.tracker.spawn(
            async move { inner.confirm(aggregate, rows, guard).await }
                .instrument(info_span!("confirmation", stage = "confirm")),
        );
        Ok(())
    }

    async fn wait_for_capacity(&self, actions: usize) -> AggregatorResult<()> {
        let limit = self.params.batching.in_flight_action_limit();
        loop {
            let in_flight = self.in_flight.actions();
            if in_flight + actions <= limit {
                return Ok(());
            }
            debug!(in_flight, actions, limit, "Waiting for in-flight capacity");
            tokio::select! {
                _ = self.stopping.cancelled() => return Err(AggregatorError::ShuttingDown),
                _ = tokio::time::sleep(self.params.batching.backpressure_poll_interval) => {}
            }
        }
    }

    async fn confirm(self: Arc<Self>, aggregate: Bundle, rows: Vec<BundleRow>, guard: InFlightGuard) {
        let started = Instant::now();
        let submission = &self.params.submission;
        let result = self.submitter.submit(&aggregate, submission.max_attempts, submission.retry_delay).await;
        let settling = guard.resolve();

        let confirmed = result.is_ok();
        if let Err(e) = self.settle(rows, result).await {
            error!(error = %e, error_chain = ?e, "Failed to record submission outcome");
        }
        drop(settling);

        AGGREGATOR_METRICS
            .confirmation_time
            .record(started.elapsed().as_secs_f64(), &[KeyValue::new("confirmed", confirmed)]);
        self.settled.send_modify(|count| *count += 1);
        self.spawn_backlog_check(None);
    }

    async fn settle(
        &self,
        rows: Vec<BundleRow>,
        result: Result<SubmissionReceipt, SubmissionError>,
    ) -> AggregatorResult<()> {
        let batching = &self.params.batching;
        match result {
            Ok(receipt) => {
                let mut group = self.table.begin().await?;
                if batching.retain_history {
                    for mut row in rows {
                        row.status = BundleStatus::Confirmed;
                        row.submit_error = None;
                        row.receipt = Some(receipt.clone());
                        group.update(&row)?;
                    }
                } else {
                    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
                    group.remove(&ids)?;
                }
                group.commit()?;
                AGGREGATOR_METRICS.aggregates_confirmed.add(1, &[]);
                Ok(())
            }
            Err(e) => {
                warn!(rows = rows.len(), error = %e, "Aggregate submission failed, requeueing its rows");
                let block = match self.execution.block_number().await {
                    Ok(block) => block,
                    Err(block_error) => {
                        warn!(error = %block_error, "Could not fetch block, requeueing from the rows' own watermark");
                        rows.iter().map(|row| row.eligible_after).max().unwrap_or_default()
                    }
                };

                let reason = e.to_string();
                let mut group = self.table.begin().await?;
                for row in rows {
                    let row_id = row.id;
                    let outcome = apply_backoff(
                        &mut group,
                        row,
                        &reason,
                        block,
                        batching.max_eligibility_delay,
                        batching.retain_history,
                    )?;
                    if outcome == BackoffOutcome::Missing {
                        debug!(row_id, "Row of failed aggregate no longer queued");
                    }
                }
                group.commit()?;
                AGGREGATOR_METRICS.aggregates_failed.add(1, &[]);
                Ok(())
            }
        }
    }

    async fn run_health_check(&self, check: HealthCheck) -> HealthReport {
        match check {
            HealthCheck::Database => {
                let counted = async {
                    let group = self.table.begin().await?;
                    let count = group.count()?;
                    group.commit()?;
                    Ok::<_, AggregatorError>(count)
                };
                match counted.await {
                    Ok(count) => HealthReport::healthy(check, format!("{count} rows")),
                    Err(e) => HealthReport::unhealthy(check, e.to_string()),
                }
            }
            HealthCheck::ExecutionBackend => match self.execution.block_number().await {
                Ok(block) => HealthReport::healthy(check, format!("block {block}")),
                Err(e) => HealthReport::unhealthy(check, e.to_string()),
            },
            HealthCheck::SubmissionCapacity => {
                let in_flight = self.in_flight.actions();
                let limit = self.params.batching.in_flight_action_limit();
                let detail = format!("{in_flight} of {limit} actions in flight");
                if in_flight < limit {
                    HealthReport::healthy(check, detail)
                } else {
                    HealthReport::unhealthy(check, detail)
                }
            }
        }
    }
}
