//! Creating, changing and deleting polls.
//!
//! Only a poll's owner may change or delete it. A poll and its options are
//! written together, so a failure never leaves a poll without its options.
//! Updates and deletions check ownership and write in the same transaction.

use chrono::{DateTime, Utc};
use mongodb::{bson::doc, Client, ClientSession, Database};

use crate::error::{Error, Result};
use crate::model::{
    api::poll::{PollSpec, PollUpdate},
    common::{identity::Identity, validation::validate_draft},
    db::{
        option::{PollOption, PollOptionCore},
        poll::Poll,
        vote::Vote,
    },
    mongodb::{is_duplicate_key_error, retry_on_conflict, Coll, Id},
};

/// Validate `spec` and store it as a new poll owned by `owner`.
///
/// Returns the poll along with its options in display order.
pub async fn create_poll(
    db_client: &Client,
    db: &Database,
    spec: PollSpec,
    owner: Identity,
    now: DateTime<Utc>,
) -> Result<(Poll, Vec<PollOption>)> {
    let texts = validate_draft(&spec.draft(), now).map_err(Error::Validation)?;

    let poll = Poll {
        id: Id::new(),
        poll: spec.into_poll(owner, now),
    };
    let options = texts
        .into_iter()
        .zip(0..)
        .map(|(text, order)| PollOption {
            id: Id::new(),
            option: PollOptionCore {
                poll_id: poll.id,
                text,
                order,
            },
        })
        .collect::<Vec<_>>();

    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        Coll::<Poll>::from_db(db)
            .insert_one_with_session(&poll, None, &mut session)
            .await?;
        Coll::<PollOption>::from_db(db)
            .insert_many_with_session(&options, None, &mut session)
            .await
            .map_err(|err| {
                if is_duplicate_key_error(&err) {
                    Error::Validation("Option texts must be unique within a poll".to_string())
                } else {
                    err.into()
                }
            })?;

        session.commit_transaction().await?;
    }

    info!(
        "Poll {} created by {} with {} options",
        poll.id,
        poll.owner,
        options.len()
    );
    Ok((poll, options))
}

/// Load a poll and check that `requester` may change it.
async fn owned_poll(
    polls: &Coll<Poll>,
    poll_id: Id,
    requester: &Identity,
    session: &mut ClientSession,
) -> Result<Poll> {
    let poll = polls
        .find_one_with_session(poll_id.as_doc(), None, session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Poll {}", poll_id)))?;

    if !poll.is_owned_by(requester) {
        warn!("{} tried to modify poll {} owned by {}", requester, poll_id, poll.owner);
        return Err(Error::Permission(format!(
            "Only the owner may modify poll {}",
            poll_id
        )));
    }
    Ok(poll)
}

/// Apply `update` to a poll owned by `requester`, returning the new state.
pub async fn update_poll(
    db_client: &Client,
    db: &Database,
    poll_id: Id,
    update: PollUpdate,
    requester: &Identity,
    now: DateTime<Utc>,
) -> Result<Poll> {
    let what = format!("update of poll {}", poll_id);
    retry_on_conflict(&what, || {
        try_update_poll(db_client, db, poll_id, &update, requester, now)
    })
    .await
}

async fn try_update_poll(
    db_client: &Client,
    db: &Database,
    poll_id: Id,
    update: &PollUpdate,
    requester: &Identity,
    now: DateTime<Utc>,
) -> Result<Poll> {
    let polls = Coll::<Poll>::from_db(db);
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let poll = owned_poll(&polls, poll_id, requester, &mut session).await?;
    if update.is_empty() {
        return Ok(poll);
    }
    update.validate(now).map_err(Error::Validation)?;

    polls
        .update_one_with_session(poll_id.as_doc(), update.to_update_doc(), None, &mut session)
        .await?;
    let poll = polls
        .find_one_with_session(poll_id.as_doc(), None, &mut session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Poll {}", poll_id)))?;
    session.commit_transaction().await?;

    debug!("Poll {} updated by {}", poll_id, requester);
    Ok(poll)
}

/// Delete a poll owned by `requester`, along with its options and votes.
pub async fn delete_poll(
    db_client: &Client,
    db: &Database,
    poll_id: Id,
    requester: &Identity,
) -> Result<()> {
    let what = format!("deletion of poll {}", poll_id);
    retry_on_conflict(&what, || try_delete_poll(db_client, db, poll_id, requester)).await
}

async fn try_delete_poll(
    db_client: &Client,
    db: &Database,
    poll_id: Id,
    requester: &Identity,
) -> Result<()> {
    let polls = Coll::<Poll>::from_db(db);
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    owned_poll(&polls, poll_id, requester, &mut session).await?;
    let filter = doc! {
        "poll_id": poll_id,
    };
    let votes = Coll::<Vote>::from_db(db)
        .delete_many_with_session(filter.clone(), None, &mut session)
        .await?;
    let options = Coll::<PollOption>::from_db(db)
        .delete_many_with_session(filter, None, &mut session)
        .await?;
    polls
        .delete_one_with_session(poll_id.as_doc(), None, &mut session)
        .await?;
    session.commit_transaction().await?;

    info!(
        "Poll {} deleted by {} ({} options, {} votes)",
        poll_id, requester, options.deleted_count, votes.deleted_count
    );
    Ok(())
}
