use std::collections::{HashMap, HashSet};

use aggregator_bundle::PublicKey;
use alloy_primitives::{I256, U256};

use crate::queue::BundleRow;

type Slot = (PublicKey, U256);

/// Groups of row indices that claim the same `(sender, nonce)` slot.
pub(crate) fn contested_groups(rows: &[BundleRow]) -> Vec<Vec<usize>> {
    let mut slots: HashMap<Slot, Vec<usize>> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        for (key, operation) in row.bundle.entries() {
            let claimants = slots.entry((*key, operation.nonce)).or_default();
            if claimants.last() != Some(&index) {
                claimants.push(index);
            }
        }
    }
    slots.into_values().filter(|claimants| claimants.len() > 1).collect()
}

/// Indices that lose at least one slot. The winner of a slot has the highest margin,
/// ties going to the oldest row. Rows without a margin rank last.
pub(crate) fn conflict_losers(
    rows: &[BundleRow],
    groups: &[Vec<usize>],
    margins: &HashMap<usize, I256>,
) -> HashSet<usize> {
    let margin_of = |index: &usize| margins.get(index).copied().unwrap_or(I256::MIN);

    let mut losers = HashSet::new();
    for group in groups {
        let winner = group
            .iter()
            .copied()
            .max_by(|a, b| margin_of(a).cmp(&margin_of(b)).then_with(|| rows[*b].id.cmp(&rows[*a].id)));
        losers.extend(group.iter().copied().filter(|index| Some(*index) != winner));
    }
    losers
}
