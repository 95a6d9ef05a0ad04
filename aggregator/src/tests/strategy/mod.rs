use std::str::FromStr;
use std::sync::Arc;

use aggregator_execution_client_interface::ExecutionClient;
use alloy_primitives::{Address, U256};
use bigdecimal::BigDecimal;
use rstest::*;

use crate::strategy::{AggregationStrategy, FeePolicy, FeeToken};
use crate::tests::common::fakes::{FakeChain, FakeSigner, BASE_GAS, GAS_PER_OPERATION};
use crate::tests::common::{bundle, bundle_with_actions, chain, key, row, signer, tagged};

fn strategy(chain: &Arc<FakeChain>, signer: &Arc<FakeSigner>, fees: FeePolicy, max_size: usize) -> AggregationStrategy {
    AggregationStrategy::new(chain.clone(), signer.clone(), fees, max_size, 4)
}

fn ids(rows: &[crate::queue::BundleRow]) -> Vec<i64> {
    rows.iter().map(|row| row.id).collect()
}

#[rstest]
#[tokio::test]
async fn empty_input_forms_nothing(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let outcome = strategy(&chain, &signer, FeePolicy::default(), 5).run(Vec::new()).await.unwrap();
    assert!(outcome.aggregate.is_none());
    assert!(outcome.included_rows.is_empty());
    assert!(outcome.failed_rows.is_empty());
}

#[rstest]
#[tokio::test]
async fn fill_stops_at_the_first_row_that_does_not_fit(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let rows = vec![
        row(1, bundle_with_actions(1, 0, 2, 10)),
        row(2, bundle_with_actions(2, 0, 2, 10)),
        row(3, bundle(3, 0, 10)),
    ];

    let outcome = strategy(&chain, &signer, FeePolicy::default(), 3).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![1]);
    assert!(outcome.failed_rows.is_empty());
    let aggregate = outcome.aggregate.unwrap();
    assert_eq!(aggregate.action_count(), 2);
    assert_eq!(outcome.expected_fee, U256::from(10));
    assert_eq!(outcome.expected_max_cost, U256::from(BASE_GAS + GAS_PER_OPERATION));
}

#[rstest]
#[tokio::test]
async fn capacity_freed_by_failures_is_refilled(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let rows = vec![row(1, bundle(1, 5, 10)), row(2, bundle(2, 0, 10)), row(3, bundle(3, 0, 10))];

    let outcome = strategy(&chain, &signer, FeePolicy::default(), 2).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![2, 3]);
    assert_eq!(outcome.failed_rows.len(), 1);
    assert_eq!(outcome.failed_rows[0].row.id, 1);
    assert_eq!(outcome.aggregate.unwrap().operation_count(), 2);
}

#[rstest]
#[tokio::test]
async fn later_candidates_see_the_accepted_aggregate(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    // Row 3 only succeeds on top of row 1, accepted in the first round.
    let rows = vec![row(1, bundle(1, 0, 10)), row(2, bundle(2, 7, 10)), row(3, bundle(1, 1, 10))];

    let outcome = strategy(&chain, &signer, FeePolicy::default(), 2).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![1, 3]);
    assert_eq!(outcome.failed_rows.len(), 1);
    assert_eq!(outcome.failed_rows[0].row.id, 2);
}

#[rstest]
#[tokio::test]
async fn rejected_candidates_do_not_shape_later_simulations(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    // Row 2 only succeeds after row 1, which underpays and is rejected in the same round.
    let fees = FeePolicy { per_gas: U256::from(1), ..FeePolicy::default() };
    let rows = vec![row(1, bundle(1, 0, 0)), row(2, bundle(1, 1, 10_000_000))];

    let outcome = strategy(&chain, &signer, fees, 5).run(rows).await.unwrap();

    assert!(outcome.aggregate.is_none());
    assert!(outcome.included_rows.is_empty());
    let failed: Vec<i64> = outcome.failed_rows.iter().map(|failed| failed.row.id).collect();
    assert_eq!(failed, vec![1, 2]);
    assert!(outcome.failed_rows[0].reason.starts_with("insufficient fee"));
    assert!(!outcome.failed_rows[1].reason.starts_with("insufficient fee"));
}

#[rstest]
#[tokio::test]
async fn candidates_of_one_round_are_simulated_independently(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let rows = vec![row(1, bundle(1, 0, 10)), row(2, bundle(2, 0, 10)), row(3, bundle(1, 1, 10))];

    let outcome = strategy(&chain, &signer, FeePolicy::default(), 5).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![1, 2]);
    assert_eq!(outcome.failed_rows.len(), 1);
    assert_eq!(outcome.failed_rows[0].row.id, 3);

    let aggregate = outcome.aggregate.unwrap();
    let simulation = chain.simulate(std::slice::from_ref(&aggregate)).await.unwrap();
    assert!(simulation[0].operation_results.iter().all(|ok| *ok));
}

#[rstest]
#[tokio::test]
async fn oversized_rows_fail(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let rows = vec![row(1, bundle_with_actions(1, 0, 3, 10)), row(2, bundle(2, 0, 10))];

    let outcome = strategy(&chain, &signer, FeePolicy::default(), 2).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![2]);
    assert_eq!(outcome.failed_rows[0].row.id, 1);
    assert!(outcome.failed_rows[0].reason.contains("aggregation limit"));
}

#[rstest]
#[tokio::test]
async fn nonce_conflict_keeps_the_better_paying_row(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let rows = vec![row(1, bundle(1, 0, 10)), row(2, bundle(1, 0, 20))];

    let outcome = strategy(&chain, &signer, FeePolicy::default(), 5).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![2]);
    assert!(outcome.failed_rows.is_empty(), "conflict losers stay pending");
}

#[rstest]
#[tokio::test]
async fn nonce_conflict_tie_goes_to_the_oldest_row(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let rows = vec![row(4, tagged(bundle(1, 0, 10), 1)), row(9, tagged(bundle(1, 0, 10), 2))];

    let outcome = strategy(&chain, &signer, FeePolicy::default(), 5).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![4]);
    assert!(outcome.failed_rows.is_empty());
}

#[rstest]
#[tokio::test]
async fn underpaying_rows_fail(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let fees = FeePolicy { per_gas: U256::from(1), ..FeePolicy::default() };
    let rows = vec![row(1, bundle(1, 0, 10)), row(2, bundle(2, 0, 1_000_000))];

    let outcome = strategy(&chain, &signer, fees, 5).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![2]);
    assert!(outcome.failed_rows[0].reason.starts_with("insufficient fee"));
}

#[rstest]
#[tokio::test]
async fn unprofitable_aggregate_below_breakeven_waits(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let fees = FeePolicy { allow_losses: false, breakeven_operation_count: 3, ..FeePolicy::default() };
    let rows = vec![row(1, bundle(1, 0, 10))];

    let outcome = strategy(&chain, &signer, fees, 5).run(rows).await.unwrap();

    assert!(outcome.aggregate.is_none());
    assert!(outcome.included_rows.is_empty());
    assert!(outcome.failed_rows.is_empty());
}

#[rstest]
#[tokio::test]
async fn unprofitable_aggregate_at_breakeven_fails_half(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let fees = FeePolicy { allow_losses: false, breakeven_operation_count: 2, ..FeePolicy::default() };
    let rows = vec![row(1, bundle(1, 0, 10)), row(2, bundle(2, 0, 10)), row(3, bundle(3, 0, 10))];

    let outcome = strategy(&chain, &signer, fees, 5).run(rows).await.unwrap();

    assert!(outcome.aggregate.is_none());
    assert!(outcome.included_rows.is_empty());
    assert_eq!(outcome.failed_rows.len(), 2);
}

#[rstest]
#[tokio::test]
async fn profitable_aggregate_passes_the_loss_gate(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    let fees = FeePolicy { allow_losses: false, ..FeePolicy::default() };
    let rows = vec![row(1, bundle(1, 0, 1_000_000))];

    let outcome = strategy(&chain, &signer, fees, 5).run(rows).await.unwrap();

    assert!(outcome.aggregate.is_some());
    assert_eq!(outcome.expected_fee, U256::from(1_000_000));
}

#[rstest]
#[case::alone(1, 80_000)]
#[case::half_of_breakeven(2, 55_000)]
#[tokio::test]
async fn required_fee_charges_a_share_of_the_overhead(
    chain: Arc<FakeChain>,
    signer: Arc<FakeSigner>,
    #[case] breakeven: usize,
    #[case] expected: u64,
) {
    let fees = FeePolicy { per_gas: U256::from(1), breakeven_operation_count: breakeven, ..FeePolicy::default() };
    let overhead = 2 * (BASE_GAS + GAS_PER_OPERATION) - (BASE_GAS + 2 * GAS_PER_OPERATION);

    let required = strategy(&chain, &signer, fees, 5).required_fee(&bundle(1, 0, 0), overhead).await.unwrap();
    assert_eq!(required, U256::from(expected));
}

#[rstest]
#[case("0.5", 3, 2)]
#[case("0.333", 1, 1)]
#[case("2", 7, 14)]
fn token_fees_round_up(#[case] ratio: &str, #[case] wei: u64, #[case] expected: u64) {
    let fees = FeePolicy {
        token: FeeToken::Token {
            address: Address::with_last_byte(1),
            eth_value_in_token: BigDecimal::from_str(ratio).unwrap(),
        },
        ..FeePolicy::default()
    };
    assert_eq!(fees.to_fee_units(U256::from(wei)).unwrap(), U256::from(expected));
}

#[rstest]
fn overhead_share_never_exceeds_the_overhead() {
    let fees = FeePolicy { breakeven_operation_count: 4, ..FeePolicy::default() };
    assert_eq!(fees.overhead_share(1_000, 1), 250);
    assert_eq!(fees.overhead_share(1_000, 3), 750);
    assert_eq!(fees.overhead_share(1_000, 9), 1_000);
    assert_eq!(fees.overhead_share(1_001, 1), 251);
}

#[rstest]
#[tokio::test]
async fn wallet_nonce_is_respected(chain: Arc<FakeChain>, signer: Arc<FakeSigner>) {
    chain.set_wallet_nonce(key(1), 3);
    let rows = vec![row(1, bundle(1, 2, 10)), row(2, bundle(1, 3, 10))];

    let outcome = strategy(&chain, &signer, FeePolicy::default(), 5).run(rows).await.unwrap();

    assert_eq!(ids(&outcome.included_rows), vec![2]);
    assert_eq!(outcome.failed_rows[0].row.id, 1);
}
