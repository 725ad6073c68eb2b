use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{option::PollOption, poll::Poll, vote::Vote};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Poll collection
const POLLS: &str = "polls";
impl MongoCollection for Poll {
    const NAME: &'static str = POLLS;
}

// Option collection
const OPTIONS: &str = "options";
impl MongoCollection for PollOption {
    const NAME: &'static str = OPTIONS;
}

// Vote collection
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}

/// Ensure that all the required indexes exist on the given database.
///
/// The unique indexes here are what make concurrent vote casting safe:
/// the application-level eligibility check can race, these cannot.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Option collection: no two options of a poll share a text.
    let option_text_index = IndexModel::builder()
        .keys(doc! {"poll_id": 1, "text": 1})
        .options(unique.clone())
        .build();
    let option_order_index = IndexModel::builder()
        .keys(doc! {"poll_id": 1, "order": 1})
        .build();
    Coll::<PollOption>::from_db(db)
        .create_indexes([option_text_index, option_order_index], None)
        .await?;

    // Vote collection.
    // A voter may vote for a given option at most once, whatever the poll allows.
    let voter_option_index = IndexModel::builder()
        .keys(doc! {"voter": 1, "option_id": 1})
        .options(unique.clone())
        .build();
    // Votes cast while their poll disallowed multiple votes are stamped
    // `exclusive`; a voter holds at most one of those per poll.
    let exclusive_voter_poll_index = IndexModel::builder()
        .keys(doc! {"poll_id": 1, "voter": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(doc! {"exclusive": true})
                .name("exclusive_voter_per_poll".to_string())
                .build(),
        )
        .build();
    let tally_index = IndexModel::builder()
        .keys(doc! {"poll_id": 1, "option_id": 1})
        .build();
    Coll::<Vote>::from_db(db)
        .create_indexes(
            [voter_option_index, exclusive_voter_poll_index, tally_index],
            None,
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use mongodb::bson::Document;
    use rocket::futures::TryStreamExt;

    use super::*;

    #[backend_test]
    async fn indexes_are_idempotent(db: Database) {
        // The test harness already created them once.
        ensure_indexes_exist(&db).await.unwrap();

        let names = db
            .collection::<Document>(VOTES)
            .list_index_names()
            .await
            .unwrap();
        assert!(names.contains(&"exclusive_voter_per_poll".to_string()));

        let indexes: Vec<IndexModel> = db
            .collection::<Document>(OPTIONS)
            .list_indexes(None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let unique_text = indexes.iter().any(|index| {
            index.keys == doc! {"poll_id": 1, "text": 1}
                && index.options.as_ref().and_then(|o| o.unique) == Some(true)
        });
        assert!(unique_text);
    }
}
