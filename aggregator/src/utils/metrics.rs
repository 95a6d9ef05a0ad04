use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};

pub static AGGREGATOR_METRICS: Lazy<AggregatorMetrics> = Lazy::new(AggregatorMetrics::register);

pub struct AggregatorMetrics {
    pub block_gauge: Gauge<u64>,
    pub bundles_accepted: Counter<u64>,
    pub bundles_rejected: Counter<u64>,
    pub rows_requeued: Counter<u64>,
    pub rows_dropped: Counter<u64>,
    pub aggregates_submitted: Counter<u64>,
    pub aggregates_confirmed: Counter<u64>,
    pub aggregates_failed: Counter<u64>,
    pub aggregate_actions: Histogram<u64>,
    pub confirmation_time: Histogram<f64>,
}

impl AggregatorMetrics {
    pub fn register() -> Self {
        let meter: Meter = global::meter("crates.aggregator.opentelemetry");

        let block_gauge = meter
            .u64_gauge("block_number")
            .with_description("Latest block observed by the aggregator")
            .with_unit("block")
            .build();

        let bundles_accepted = meter
            .u64_counter("bundles_accepted")
            .with_description("Count of bundles admitted to the queue")
            .with_unit("bundles")
            .build();

        let bundles_rejected = meter
            .u64_counter("bundles_rejected")
            .with_description("Count of bundles rejected at admission, by failure kind")
            .with_unit("bundles")
            .build();

        let rows_requeued = meter
            .u64_counter("rows_requeued")
            .with_description("Count of queue rows pushed back with a longer eligibility delay")
            .with_unit("rows")
            .build();

        let rows_dropped = meter
            .u64_counter("rows_dropped")
            .with_description("Count of queue rows dropped after exceeding the eligibility delay ceiling")
            .with_unit("rows")
            .build();

        let aggregates_submitted = meter
            .u64_counter("aggregates_submitted")
            .with_description("Count of aggregate bundles handed to the submitter")
            .with_unit("aggregates")
            .build();

        let aggregates_confirmed = meter
            .u64_counter("aggregates_confirmed")
            .with_description("Count of aggregate bundles confirmed on chain")
            .with_unit("aggregates")
            .build();

        let aggregates_failed = meter
            .u64_counter("aggregates_failed")
            .with_description("Count of aggregate bundles whose submission failed")
            .with_unit("aggregates")
            .build();

        let aggregate_actions = meter
            .u64_histogram("aggregate_actions")
            .with_description("Number of actions in each submitted aggregate")
            .with_unit("actions")
            .build();

        let confirmation_time = meter
            .f64_histogram("confirmation_time")
            .with_description("Time from submission to a settled outcome")
            .with_unit("s")
            .build();

        Self {
            block_gauge,
            bundles_accepted,
            bundles_rejected,
            rows_requeued,
            rows_dropped,
            aggregates_submitted,
            aggregates_confirmed,
            aggregates_failed,
            aggregate_actions,
            confirmation_time,
        }
    }
}
