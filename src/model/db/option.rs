use std::ops::{Deref, DerefMut};

use mongodb::{bson::doc, options::FindOptions, ClientSession};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::mongodb::{Coll, Id};

/// Core option data. An option belongs to exactly one poll, and its text is
/// unique within that poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOptionCore {
    pub poll_id: Id,
    pub text: String,
    /// Display position within the poll, starting at zero.
    pub order: u32,
}

/// An option from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub option: PollOptionCore,
}

impl PollOption {
    /// All options of a poll, in display order.
    pub async fn for_poll(
        options: &Coll<PollOption>,
        poll_id: Id,
        session: &mut ClientSession,
    ) -> Result<Vec<PollOption>> {
        let sort = FindOptions::builder().sort(doc! {"order": 1}).build();
        let options = options
            .find_with_session(doc! {"poll_id": poll_id}, sort, session)
            .await?
            .stream(session)
            .try_collect()
            .await?;
        Ok(options)
    }
}

impl Deref for PollOption {
    type Target = PollOptionCore;

    fn deref(&self) -> &Self::Target {
        &self.option
    }
}

impl DerefMut for PollOption {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.option
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl PollOption {
        pub fn example(poll_id: Id, text: &str, order: u32) -> Self {
            Self {
                id: Id::new(),
                option: PollOptionCore {
                    poll_id,
                    text: text.to_string(),
                    order,
                },
            }
        }
    }
}
