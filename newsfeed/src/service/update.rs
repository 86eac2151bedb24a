use std::collections::HashSet;

use crate::{database::SeenIds, resource::NewsId, Error};

/// Ids present in `current` but not in `previous`, ascending.
///
/// Ascending order is the order news get processed and notified in.
pub fn new_ids(current: &HashSet<NewsId>, previous: &SeenIds) -> Vec<NewsId> {
    let mut ids: Vec<_> = current
        .iter()
        .filter(|id| !previous.contains(id))
        .copied()
        .collect();
    ids.sort_unstable();
    ids
}

/// Result of working on one news.
#[derive(Debug)]
pub struct ItemOutcome {
    pub id: NewsId,
    pub result: Result<ItemDelivery, Error>,
}

/// What happened to a news that was processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemDelivery {
    /// Notifications sent, one per attachment or one without any.
    pub notifications: usize,
    /// Whether the server accepted the read mark.
    pub marked_read: bool,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of one update cycle.
#[derive(Debug)]
pub enum CycleReport {
    /// No history existed: the fetched ids became the baseline and nothing was sent.
    Bootstrapped { baseline: SeenIds },
    /// News newer than the history were processed, in ascending order.
    Checked {
        outcomes: Vec<ItemOutcome>,
        saved: SeenIds,
    },
}

impl CycleReport {
    pub fn outcomes(&self) -> &[ItemOutcome] {
        match self {
            CycleReport::Bootstrapped { .. } => &[],
            CycleReport::Checked { outcomes, .. } => outcomes,
        }
    }

    /// Ids that were processed without a fatal error.
    pub fn succeeded(&self) -> impl Iterator<Item = NewsId> + '_ {
        self.outcomes()
            .iter()
            .filter(|outcome| outcome.is_success())
            .map(|outcome| outcome.id)
    }

    pub fn failures(&self) -> impl Iterator<Item = (NewsId, &Error)> + '_ {
        self.outcomes()
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err().map(|e| (outcome.id, e)))
    }

    /// The history as written at the end of the cycle.
    pub fn saved(&self) -> &SeenIds {
        match self {
            CycleReport::Bootstrapped { baseline } => baseline,
            CycleReport::Checked { saved, .. } => saved,
        }
    }
}
