use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct InFlightState {
    /// Rows of aggregates that were sent and have not resolved yet.
    unconfirmed: HashSet<i64>,
    /// Rows whose aggregate resolved but whose queue update has not committed.
    settling: HashSet<i64>,
    actions: usize,
}

/// Process-local view of rows that must not be selected again.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlightTracker {
    state: Arc<Mutex<InFlightState>>,
}

impl InFlightTracker {
    pub(crate) fn excluded_ids(&self) -> HashSet<i64> {
        let state = self.state();
        state.unconfirmed.union(&state.settling).copied().collect()
    }

    pub(crate) fn actions(&self) -> usize {
        self.state().actions
    }

    pub(crate) fn register(&self, ids: Vec<i64>, actions: usize) -> InFlightGuard {
        let mut state = self.state();
        state.unconfirmed.extend(ids.iter().copied());
        state.actions += actions;
        InFlightGuard { tracker: self.clone(), ids, actions, resolved: false }
    }

    fn state(&self) -> MutexGuard<'_, InFlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps rows and their actions registered while an aggregate is outstanding.
/// Dropping it unresolved releases everything.
pub(crate) struct InFlightGuard {
    tracker: InFlightTracker,
    ids: Vec<i64>,
    actions: usize,
    resolved: bool,
}

impl InFlightGuard {
    /// Frees the action capacity, keeping the rows excluded until the returned guard drops.
    pub(crate) fn resolve(mut self) -> SettlingGuard {
        let ids = std::mem::take(&mut self.ids);
        {
            let mut state = self.tracker.state();
            for id in &ids {
                state.unconfirmed.remove(id);
                state.settling.insert(*id);
            }
            state.actions = state.actions.saturating_sub(self.actions);
        }
        self.resolved = true;
        SettlingGuard { tracker: self.tracker.clone(), ids }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let mut state = self.tracker.state();
        for id in &self.ids {
            state.unconfirmed.remove(id);
        }
        state.actions = state.actions.saturating_sub(self.actions);
    }
}

pub(crate) struct SettlingGuard {
    tracker: InFlightTracker,
    ids: Vec<i64>,
}

impl Drop for SettlingGuard {
    fn drop(&mut self) {
        let mut state = self.tracker.state();
        for id in &self.ids {
            state.settling.remove(id);
        }
    }
}
