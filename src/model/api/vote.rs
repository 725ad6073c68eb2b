use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{api::id::ApiId, common::identity::Identity, db::vote::Vote};

/// A request to vote for an option of a poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub option_id: ApiId,
}

/// Confirmation of a recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub id: ApiId,
    pub poll_id: ApiId,
    pub option_id: ApiId,
    pub voter: Identity,
    pub cast_at: DateTime<Utc>,
}

impl From<Vote> for VoteReceipt {
    fn from(vote: Vote) -> Self {
        Self {
            id: vote.id.into(),
            poll_id: vote.poll_id.into(),
            option_id: vote.option_id.into(),
            cast_at: vote.cast_at,
            voter: vote.vote.voter,
        }
    }
}
