use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Document},
    error::Error as DbError,
    ClientSession,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    common::{identity::Identity, tally::Tally},
    mongodb::{Coll, Id},
};

/// Core vote data. Votes are immutable once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub voter: Identity,
    pub option_id: Id,
    /// The poll the option belongs to, copied here so votes can be looked
    /// up and constrained per poll.
    pub poll_id: Id,
    /// True iff the poll disallowed multiple votes when this vote was cast.
    /// A partial unique index allows only one exclusive vote per voter and poll.
    pub exclusive: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
    /// Where the vote came from. Informational only.
    pub source_address: Option<String>,
}

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

/// One row of the tally aggregation.
#[derive(Debug, Deserialize)]
struct OptionCount {
    #[serde(rename = "_id")]
    option_id: Id,
    count: i64,
}

/// Where to look for an existing vote by a voter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VoteScope {
    /// Any vote in this poll.
    Poll(Id),
    /// A vote for this option.
    Option(Id),
}

impl Vote {
    /// Find a vote already cast by `voter` within `scope`, if any.
    pub async fn find_existing(
        votes: &Coll<Vote>,
        voter: &Identity,
        scope: VoteScope,
        session: &mut ClientSession,
    ) -> Result<Option<Vote>> {
        let filter = match scope {
            VoteScope::Poll(poll_id) => doc! {"voter": voter.as_str(), "poll_id": poll_id},
            VoteScope::Option(option_id) => doc! {"voter": voter.as_str(), "option_id": option_id},
        };
        Ok(votes.find_one_with_session(filter, None, session).await?)
    }

    /// Number of votes cast for a single option.
    pub async fn count_for_option(
        votes: &Coll<Vote>,
        option_id: Id,
        session: &mut ClientSession,
    ) -> Result<u64> {
        let filter = doc! {"option_id": option_id};
        Ok(votes
            .count_documents_with_session(filter, None, session)
            .await?)
    }

    /// The options of `poll_id` that `voter` has already voted for.
    pub async fn options_voted(
        votes: &Coll<Vote>,
        voter: &Identity,
        poll_id: Id,
        session: &mut ClientSession,
    ) -> Result<Vec<Id>> {
        let filter = doc! {
            "poll_id": poll_id,
            "voter": voter.as_str(),
        };
        let voted = votes
            .find_with_session(filter, None, session)
            .await?
            .stream(session)
            .map_ok(|vote| vote.option_id)
            .try_collect()
            .await?;
        Ok(voted)
    }

    /// Count the votes of each option of `poll_id`.
    ///
    /// Options without votes are absent from the result, and read as zero.
    pub async fn tally(
        votes: &Coll<Vote>,
        poll_id: Id,
        session: &mut ClientSession,
    ) -> Result<Tally> {
        let pipeline = [
            doc! {"$match": {"poll_id": poll_id}},
            doc! {"$group": {"_id": "$option_id", "count": {"$sum": 1}}},
        ];
        let rows: Vec<Document> = votes
            .aggregate_with_session(pipeline, None, session)
            .await?
            .stream(session)
            .try_collect()
            .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let row: OptionCount = mongodb::bson::from_document(row).map_err(DbError::from)?;
            counts.push((row.option_id, u64::try_from(row.count).unwrap_or_default()));
        }
        Ok(Tally::from_counts(counts))
    }
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}


#[cfg(test)]
mod tests {
    use rocket::local::asynchronous::Client;

    use super::*;
    use mongodb::Database;

    #[backend_test]
    async fn vote_lookups(client: Client, db: Database, votes: Coll<Vote>) {
        let db_client = client.rocket().state::<mongodb::Client>().unwrap();
        let mut session = db_client.start_session(None).await.unwrap();

        let poll_id = Id::new();
        let (first, second) = (Id::new(), Id::new());
        let bob = Identity::voter_example();
        let carol = Identity::voter_example2();
        let cast = [(&bob, first), (&bob, second), (&carol, first)];
        for (voter, option_id) in cast {
            let vote = Vote {
                id: Id::new(),
                vote: VoteCore::example(voter.clone(), poll_id, option_id, false),
            };
            votes.insert_one(&vote, None).await.unwrap();
        }
        // Votes elsewhere are not counted.
        let elsewhere = Vote {
            id: Id::new(),
            vote: VoteCore::example(bob.clone(), Id::new(), Id::new(), true),
        };
        votes.insert_one(&elsewhere, None).await.unwrap();

        let mut voted = Vote::options_voted(&votes, &bob, poll_id, &mut session)
            .await
            .unwrap();
        voted.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(voted, expected);

        let existing = Vote::find_existing(&votes, &carol, VoteScope::Poll(poll_id), &mut session)
            .await
            .unwrap();
        assert_eq!(existing.map(|v| v.option_id), Some(first));
        let existing =
            Vote::find_existing(&votes, &carol, VoteScope::Option(second), &mut session)
                .await
                .unwrap();
        assert!(existing.is_none());

        assert_eq!(
            Vote::count_for_option(&votes, first, &mut session)
                .await
                .unwrap(),
            2
        );

        let tally = Vote::tally(&votes, poll_id, &mut session).await.unwrap();
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.count(&first), 2);
        assert_eq!(tally.count(&second), 1);
    }

    #[backend_test]
    async fn one_exclusive_vote_per_voter_and_poll(_db: Database, votes: Coll<Vote>) {
        let poll_id = Id::new();
        let voter = Identity::voter_example();
        let first = Vote {
            id: Id::new(),
            vote: VoteCore::example(voter.clone(), poll_id, Id::new(), true),
        };
        votes.insert_one(&first, None).await.unwrap();

        let second = Vote {
            id: Id::new(),
            vote: VoteCore::example(voter.clone(), poll_id, Id::new(), true),
        };
        let err = votes.insert_one(&second, None).await.unwrap_err();
        assert!(crate::model::mongodb::is_duplicate_key_error(&err));

        // The same option twice is refused whatever the poll allows.
        let again = Vote {
            id: Id::new(),
            vote: VoteCore {
                exclusive: false,
                ..first.vote.clone()
            },
        };
        let err = votes.insert_one(&again, None).await.unwrap_err();
        assert!(crate::model::mongodb::is_duplicate_key_error(&err));
    }
}
