use std::collections::HashMap;

use crate::model::mongodb::Id;

/// Vote counts per option of a single poll, as read from the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    counts: HashMap<Id, u64>,
    total: u64,
}

impl Tally {
    /// Build a tally from `(option, count)` pairs. Options with no votes may
    /// simply be absent.
    pub fn from_counts(counts: impl IntoIterator<Item = (Id, u64)>) -> Self {
        let counts: HashMap<Id, u64> = counts.into_iter().collect();
        let total = counts.values().sum();
        Self { counts, total }
    }

    /// Total number of votes across all options.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of votes for the given option.
    pub fn count(&self, option: &Id) -> u64 {
        self.counts.get(option).copied().unwrap_or(0)
    }

    /// The given option's share of the vote.
    pub fn percentage(&self, option: &Id) -> f64 {
        percentage(self.count(option), self.total)
    }
}

/// `count` as a percentage of `total`, rounded to two decimal places with
/// ties going to the even digit. Zero when there are no votes at all.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let exact = count as f64 / total as f64 * 100.0;
    (exact * 100.0).round_ties_even() / 100.0
}
