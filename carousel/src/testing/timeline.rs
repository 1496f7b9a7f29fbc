//! Helpers for checking the progress events a run produced.

use crate::core::{StageProgress, StageStatus};
use crate::observer::{CollectingObserver, ObserverEvent};

/// Returns the status sequence each stage went through, starting from the
/// implicit `Waiting`.
#[must_use]
pub fn status_timeline(progress: &[StageProgress], stage_count: usize) -> Vec<Vec<StageStatus>> {
    let mut timeline = vec![vec![StageStatus::Waiting]; stage_count];
    for update in progress {
        if let Some(stages) = timeline.get_mut(update.stage_index) {
            stages.push(update.status);
        }
    }
    timeline
}

/// Returns the per-stage timeline recorded by `observer`.
#[must_use]
pub fn observed_timeline(observer: &CollectingObserver, stage_count: usize) -> Vec<Vec<StageStatus>> {
    status_timeline(&observer.progress(), stage_count)
}

/// Returns true if every status change is a forward transition or a reset
/// to `Waiting`.
#[must_use]
pub fn is_monotonic(statuses: &[StageStatus]) -> bool {
    statuses
        .windows(2)
        .all(|pair| pair[1] == StageStatus::Waiting || pair[0].can_advance_to(pair[1]))
}

/// Returns the largest number of stages that were awaiting a human at the
/// same time, replaying the recorded events in order.
#[must_use]
pub fn max_concurrently_awaiting(events: &[ObserverEvent], stage_count: usize) -> usize {
    let mut current = vec![StageStatus::Waiting; stage_count];
    let mut max = 0;
    for event in events {
        if let ObserverEvent::Progress { stage_index, status } = event {
            if let Some(slot) = current.get_mut(*stage_index) {
                *slot = *status;
            }
            let awaiting = current
                .iter()
                .filter(|status| **status == StageStatus::AwaitingHuman)
                .count();
            max = max.max(awaiting);
        }
    }
    max
}

/// Panics unless every stage timeline is monotonic.
pub fn assert_monotonic(timeline: &[Vec<StageStatus>]) {
    for (index, statuses) in timeline.iter().enumerate() {
        assert!(
            is_monotonic(statuses),
            "stage {index} went backwards: {statuses:?}"
        );
    }
}
