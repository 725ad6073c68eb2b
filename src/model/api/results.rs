use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::tally::Tally,
    db::{option::PollOption, poll::Poll},
};

/// Aggregated results of a poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResults {
    pub poll_id: ApiId,
    pub title: String,
    pub total_votes: u64,
    /// In display order.
    pub per_option: Vec<OptionResult>,
    pub is_expired: bool,
    pub is_active: bool,
}

/// One option's share of the vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResult {
    pub option_id: ApiId,
    pub text: String,
    pub count: u64,
    /// Rounded to two decimal places; zero when nobody has voted.
    pub percentage: f64,
}

impl PollResults {
    /// Build the results for `poll`, whose options must already be sorted
    /// by display order.
    pub fn new(poll: &Poll, options: &[PollOption], tally: &Tally, now: DateTime<Utc>) -> Self {
        let per_option = options
            .iter()
            .map(|option| OptionResult {
                option_id: option.id.into(),
                text: option.text.clone(),
                count: tally.count(&option.id),
                percentage: tally.percentage(&option.id),
            })
            .collect();

        Self {
            poll_id: poll.id.into(),
            title: poll.title.clone(),
            total_votes: tally.total(),
            per_option,
            is_expired: poll.is_expired(now),
            is_active: poll.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::{db::poll::PollCore, mongodb::Id};

    #[test]
    fn results_follow_option_order_and_tally() {
        let poll = Poll {
            id: Id::new(),
            poll: PollCore::example(),
        };
        let options = vec![
            PollOption::example(poll.id, "A", 0),
            PollOption::example(poll.id, "B", 1),
            PollOption::example(poll.id, "C", 2),
        ];
        let tally = Tally::from_counts([(options[0].id, 3), (options[1].id, 1)]);

        let results = PollResults::new(&poll, &options, &tally, Utc::now());
        assert_eq!(results.total_votes, 4);
        assert!(results.is_active);
        assert!(!results.is_expired);

        let summary: Vec<_> = results
            .per_option
            .iter()
            .map(|r| (r.text.as_str(), r.count, r.percentage))
            .collect();
        assert_eq!(
            summary,
            vec![("A", 3, 75.0), ("B", 1, 25.0), ("C", 0, 0.0)]
        );
    }

    #[test]
    fn expiry_reported_against_given_time() {
        let mut core = PollCore::example();
        let now = Utc::now();
        core.expires_at = Some(now + Duration::hours(1));
        let poll = Poll {
            id: Id::new(),
            poll: core,
        };

        let before = PollResults::new(&poll, &[], &Tally::default(), now);
        assert!(!before.is_expired);
        let after = PollResults::new(&poll, &[], &Tally::default(), now + Duration::hours(2));
        assert!(after.is_expired);
        assert_eq!(after.total_votes, 0);
    }
}
