//! Read-only views of a poll and its votes.
//!
//! Each view is read from a single snapshot, so counts always add up to the
//! total even while votes are being cast.

use chrono::{DateTime, Utc};
use mongodb::{options::SessionOptions, Client, ClientSession, Database};

use crate::error::{Error, Result};
use crate::model::{
    api::{poll::PollDescription, results::PollResults},
    common::{identity::Identity, tally::Tally},
    db::{option::PollOption, poll::Poll, vote::Vote},
    mongodb::{Coll, Id},
};

async fn snapshot_session(db_client: &Client) -> Result<ClientSession> {
    let session_options = SessionOptions::builder().snapshot(true).build();
    Ok(db_client.start_session(Some(session_options)).await?)
}

/// Load a poll, its options in display order and its vote counts.
async fn load_poll(
    db: &Database,
    poll_id: Id,
    session: &mut ClientSession,
) -> Result<(Poll, Vec<PollOption>, Tally)> {
    let poll = Coll::<Poll>::from_db(db)
        .find_one_with_session(poll_id.as_doc(), None, session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Poll {}", poll_id)))?;
    let options = PollOption::for_poll(&Coll::from_db(db), poll_id, session).await?;
    let tally = Vote::tally(&Coll::from_db(db), poll_id, session).await?;
    Ok((poll, options, tally))
}

/// Count the votes of a poll.
pub async fn compute_results(
    db_client: &Client,
    db: &Database,
    poll_id: Id,
    now: DateTime<Utc>,
) -> Result<PollResults> {
    let mut session = snapshot_session(db_client).await?;
    let (poll, options, tally) = load_poll(db, poll_id, &mut session).await?;
    Ok(PollResults::new(&poll, &options, &tally, now))
}

/// Describe a poll, including which options `requester` has voted for.
pub async fn describe_poll(
    db_client: &Client,
    db: &Database,
    poll_id: Id,
    requester: Option<&Identity>,
    now: DateTime<Utc>,
) -> Result<PollDescription> {
    let mut session = snapshot_session(db_client).await?;
    let (poll, options, tally) = load_poll(db, poll_id, &mut session).await?;
    let user_votes = match requester {
        Some(voter) => {
            Vote::options_voted(&Coll::from_db(db), voter, poll_id, &mut session).await?
        }
        None => Vec::new(),
    };
    Ok(PollDescription::new(poll, options, &tally, user_votes, now))
}
