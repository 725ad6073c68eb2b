//! Recording votes.
//!
//! A vote is checked and written inside one transaction. Two concurrent votes
//! can both pass the check; the unique indexes on the vote collection then
//! reject the second write, which is reported as a duplicate vote.
//!
//! The transaction also writes the poll document, so a vote and a concurrent
//! update or deletion of its poll cannot both commit. The loser is run again
//! and sees the winner's result. Votes in the same poll conflict with each
//! other the same way.

use chrono::{DateTime, Utc};
use mongodb::{bson::doc, Client, Database};

use crate::error::{Error, Result};
use crate::model::{
    common::{
        eligibility::{check_eligibility, DenyReason, VoteAttempt},
        identity::Identity,
    },
    db::{
        option::PollOption,
        poll::Poll,
        vote::{Vote, VoteCore, VoteScope},
    },
    mongodb::{is_duplicate_key_error, retry_on_conflict, Coll, Id},
};

/// Cast a vote by `voter` for `option_id` in poll `poll_id`.
pub async fn cast_vote(
    db_client: &Client,
    db: &Database,
    poll_id: Id,
    option_id: Id,
    voter: &Identity,
    source_address: Option<String>,
    now: DateTime<Utc>,
) -> Result<Vote> {
    let what = format!("vote by {} in poll {}", voter, poll_id);
    retry_on_conflict(&what, || {
        try_cast_vote(
            db_client,
            db,
            poll_id,
            option_id,
            voter,
            source_address.clone(),
            now,
        )
    })
    .await
    .map_err(|err| match err {
        Error::Db(err) if is_duplicate_key_error(&err) => {
            info!("Concurrent duplicate vote by {} in poll {}", voter, poll_id);
            DenyReason::DuplicateVote.into()
        }
        err => err,
    })
}

/// One transactional attempt at recording a vote.
async fn try_cast_vote(
    db_client: &Client,
    db: &Database,
    poll_id: Id,
    option_id: Id,
    voter: &Identity,
    source_address: Option<String>,
    now: DateTime<Utc>,
) -> Result<Vote> {
    let polls = Coll::<Poll>::from_db(db);
    let options = Coll::<PollOption>::from_db(db);
    let votes = Coll::<Vote>::from_db(db);

    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let poll = polls
        .find_one_with_session(poll_id.as_doc(), None, &mut session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Poll {}", poll_id)))?;
    let option = options
        .find_one_with_session(option_id.as_doc(), None, &mut session)
        .await?;

    // A single-vote poll refuses any earlier vote, otherwise only the same option.
    let scope = if poll.allow_multiple_votes {
        VoteScope::Option(option_id)
    } else {
        VoteScope::Poll(poll_id)
    };
    let prior_votes = Vote::find_existing(&votes, voter, scope, &mut session)
        .await?
        .map(|vote| vec![vote.option_id])
        .unwrap_or_default();

    let attempt = VoteAttempt {
        poll: &poll,
        option: option.as_ref(),
        prior_votes: &prior_votes,
        now,
    };
    if let Err(reason) = check_eligibility(&attempt).into_result() {
        debug!(
            "Vote by {} for option {} in poll {} refused: {:?}",
            voter, option_id, poll_id, reason
        );
        return Err(reason.into());
    }

    let vote = Vote {
        id: Id::new(),
        vote: VoteCore {
            voter: voter.clone(),
            option_id,
            poll_id,
            exclusive: !poll.allow_multiple_votes,
            cast_at: now,
            source_address,
        },
    };
    votes
        .insert_one_with_session(&vote, None, &mut session)
        .await?;
    let option_votes = Vote::count_for_option(&votes, option_id, &mut session).await?;

    // Last write before commit, to keep the window for conflicts short.
    polls
        .update_one_with_session(
            poll_id.as_doc(),
            doc! {"$inc": {"votes_cast": 1}},
            None,
            &mut session,
        )
        .await?;
    session.commit_transaction().await?;

    debug!("Option {} of poll {} has {} votes", option_id, poll_id, option_votes);
    info!("Vote {} recorded for poll {}", vote.id, poll_id);
    Ok(vote)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{local::asynchronous::Client, tokio};

    use super::*;
    use crate::model::{
        api::poll::PollSpec,
        common::clock::{Clock, FixedClock},
        lifecycle::create_poll,
    };

    fn db_client(client: &Client) -> &mongodb::Client {
        client.rocket().state::<mongodb::Client>().unwrap()
    }

    async fn poll_from(client: &Client, db: &Database, spec: PollSpec) -> (Poll, Vec<PollOption>) {
        create_poll(
            db_client(client),
            db,
            spec,
            Identity::owner_example(),
            Utc::now(),
        )
        .await
        .unwrap()
    }

    async fn vote(
        client: &Client,
        db: &Database,
        poll: &Poll,
        option: &PollOption,
        voter: &Identity,
    ) -> Result<Vote> {
        cast_vote(
            db_client(client),
            db,
            poll.id,
            option.id,
            voter,
            None,
            Utc::now(),
        )
        .await
    }

    fn denial(result: Result<Vote>) -> DenyReason {
        match result {
            Err(Error::Denied(reason)) => reason,
            other => panic!("expected a denial, got {:?}", other),
        }
    }

    #[backend_test]
    async fn single_vote_poll(client: Client, db: Database, votes: Coll<Vote>) {
        let (poll, options) = poll_from(&client, &db, PollSpec::example()).await;
        let voter = Identity::voter_example();

        let cast = vote(&client, &db, &poll, &options[0], &voter).await.unwrap();
        assert_eq!(cast.voter, voter);
        assert_eq!(cast.option_id, options[0].id);
        assert!(cast.exclusive);

        let again = vote(&client, &db, &poll, &options[0], &voter).await;
        assert_eq!(denial(again), DenyReason::DuplicateVote);
        let other = vote(&client, &db, &poll, &options[1], &voter).await;
        assert_eq!(denial(other), DenyReason::DuplicateVote);

        // Someone else may still vote.
        vote(&client, &db, &poll, &options[1], &Identity::voter_example2())
            .await
            .unwrap();
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 2);
    }

    #[backend_test]
    async fn multiple_vote_poll(client: Client, db: Database) {
        let (poll, options) = poll_from(&client, &db, PollSpec::multiple_example()).await;
        let voter = Identity::voter_example();

        for option in &options {
            let cast = vote(&client, &db, &poll, option, &voter).await.unwrap();
            assert!(!cast.exclusive);
        }
        let again = vote(&client, &db, &poll, &options[2], &voter).await;
        assert_eq!(denial(again), DenyReason::DuplicateVote);
    }

    #[backend_test]
    async fn option_of_another_poll(client: Client, db: Database) {
        let (poll, _) = poll_from(&client, &db, PollSpec::example()).await;
        let (_, other_options) = poll_from(&client, &db, PollSpec::multiple_example()).await;
        let voter = Identity::voter_example();

        let result = vote(&client, &db, &poll, &other_options[0], &voter).await;
        assert_eq!(denial(result), DenyReason::OptionNotInPoll);

        let missing = cast_vote(
            db_client(&client),
            &db,
            poll.id,
            Id::new(),
            &voter,
            None,
            Utc::now(),
        )
        .await;
        assert_eq!(denial(missing), DenyReason::OptionNotInPoll);
    }

    #[backend_test]
    async fn closed_polls_refuse_votes(client: Client, db: Database) {
        let mut inactive = PollSpec::example();
        inactive.is_active = false;
        let (poll, options) = poll_from(&client, &db, inactive).await;
        let voter = Identity::voter_example();
        let result = vote(&client, &db, &poll, &options[0], &voter).await;
        assert_eq!(denial(result), DenyReason::PollInactive);

        let mut expiring = PollSpec::example();
        expiring.expires_at = Some(Utc::now() + Duration::hours(1));
        let (poll, options) = poll_from(&client, &db, expiring).await;
        let clock = FixedClock::new(Utc::now());
        clock.advance(Duration::hours(2));
        let result = cast_vote(
            db_client(&client),
            &db,
            poll.id,
            options[0].id,
            &voter,
            None,
            clock.now(),
        )
        .await;
        assert_eq!(denial(result), DenyReason::PollExpired);
    }

    #[backend_test]
    async fn missing_poll(client: Client, db: Database) {
        let result = cast_vote(
            db_client(&client),
            &db,
            Id::new(),
            Id::new(),
            &Identity::voter_example(),
            None,
            Utc::now(),
        )
        .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[backend_test]
    async fn concurrent_votes_record_once(client: Client, db: Database, votes: Coll<Vote>) {
        let (poll, options) = poll_from(&client, &db, PollSpec::example()).await;
        let voter = Identity::voter_example();

        let (first, second) = tokio::join!(
            vote(&client, &db, &poll, &options[0], &voter),
            vote(&client, &db, &poll, &options[1], &voter),
        );

        // Exactly one vote wins; the loser is told why, or to retry.
        let outcomes = [&first, &second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        for result in outcomes.into_iter().filter(|r| r.is_err()) {
            assert!(matches!(
                result,
                Err(Error::Denied(DenyReason::DuplicateVote)) | Err(Error::StorageConflict)
            ));
        }
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn concurrent_same_option_votes_record_once(
        client: Client,
        db: Database,
        votes: Coll<Vote>,
    ) {
        let (poll, options) = poll_from(&client, &db, PollSpec::example()).await;
        let voter = Identity::voter_example();

        let (first, second) = tokio::join!(
            vote(&client, &db, &poll, &options[0], &voter),
            vote(&client, &db, &poll, &options[0], &voter),
        );

        let (winner, loser) = if first.is_ok() {
            (first, second)
        } else {
            (second, first)
        };
        assert_eq!(winner.unwrap().option_id, options[0].id);
        assert_eq!(denial(loser), DenyReason::DuplicateVote);

        let filter = doc! {
            "voter": voter.as_str(),
            "option_id": options[0].id,
        };
        assert_eq!(votes.count_documents(filter, None).await.unwrap(), 1);
    }
}
