//! The rules deciding whether a voter may vote for an option.
//!
//! Everything here is pure: the caller loads the poll, the option and the
//! voter's previous votes, and gets back a decision. Inside the vote
//! transaction this is the informative first line of defence; the unique
//! indexes on the vote collection are the final word.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    db::{option::PollOption, poll::Poll},
    mongodb::Id,
};

/// Why a vote was refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum DenyReason {
    #[error("the option does not belong to this poll")]
    OptionNotInPoll,
    #[error("the poll is not active")]
    PollInactive,
    #[error("the poll has expired")]
    PollExpired,
    #[error("the voter has already voted")]
    DuplicateVote,
}

impl DenyReason {
    /// Machine-readable code, as reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OptionNotInPoll => "OptionNotInPoll",
            Self::PollInactive => "PollInactive",
            Self::PollExpired => "PollExpired",
            Self::DuplicateVote => "DuplicateVote",
        }
    }
}

/// The outcome of an eligibility check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Allow,
    Deny(DenyReason),
}

impl Eligibility {
    pub fn is_allowed(&self) -> bool {
        *self == Self::Allow
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(reason),
        }
    }
}

/// Everything the rules look at.
#[derive(Debug, Copy, Clone)]
pub struct VoteAttempt<'a> {
    pub poll: &'a Poll,
    /// `None` if the requested option does not exist at all.
    pub option: Option<&'a PollOption>,
    /// Options of this poll the voter has already voted for.
    pub prior_votes: &'a [Id],
    pub now: DateTime<Utc>,
}

type Rule = fn(&VoteAttempt<'_>) -> Option<DenyReason>;

/// Evaluated in order; the first violation is reported, so the most
/// fundamental problem wins.
const RULES: [Rule; 4] = [
    option_in_poll,
    poll_is_active,
    poll_not_expired,
    not_a_duplicate,
];

fn option_in_poll(attempt: &VoteAttempt<'_>) -> Option<DenyReason> {
    match attempt.option {
        Some(option) if option.poll_id == attempt.poll.id => None,
        _ => Some(DenyReason::OptionNotInPoll),
    }
}

fn poll_is_active(attempt: &VoteAttempt<'_>) -> Option<DenyReason> {
    (!attempt.poll.is_active).then_some(DenyReason::PollInactive)
}

fn poll_not_expired(attempt: &VoteAttempt<'_>) -> Option<DenyReason> {
    attempt
        .poll
        .is_expired(attempt.now)
        .then_some(DenyReason::PollExpired)
}

fn not_a_duplicate(attempt: &VoteAttempt<'_>) -> Option<DenyReason> {
    let duplicate = if attempt.poll.allow_multiple_votes {
        // Only reached once `option_in_poll` has passed.
        attempt
            .option
            .map_or(false, |option| attempt.prior_votes.contains(&option.id))
    } else {
        !attempt.prior_votes.is_empty()
    };
    duplicate.then_some(DenyReason::DuplicateVote)
}

/// Decide whether the vote described by `attempt` may be recorded.
pub fn check_eligibility(attempt: &VoteAttempt<'_>) -> Eligibility {
    RULES
        .iter()
        .find_map(|rule| rule(attempt))
        .map_or(Eligibility::Allow, Eligibility::Deny)
}
