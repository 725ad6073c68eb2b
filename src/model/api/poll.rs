use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Deserializer, Serialize};

use crate::model::{
    api::id::ApiId,
    common::{
        identity::Identity,
        tally::Tally,
        validation::{check_expiry, check_title, PollDraft},
    },
    db::{
        option::PollOption,
        poll::{Poll, PollCore},
    },
    mongodb::Id,
};

/// A request to create a poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSpec {
    /// Question shown to voters.
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// When voting closes, if ever.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    /// Whether a voter may vote for several different options.
    #[serde(default)]
    pub allow_multiple_votes: bool,
    /// Option texts, in display order. Repeats are dropped.
    pub options: Vec<String>,
}

fn active_by_default() -> bool {
    true
}

impl PollSpec {
    /// The parts of this spec subject to validation.
    pub fn draft(&self) -> PollDraft<'_> {
        PollDraft {
            title: &self.title,
            options: &self.options,
            expires_at: self.expires_at,
            is_active: self.is_active,
            allow_multiple_votes: self.allow_multiple_votes,
        }
    }

    /// Convert this spec into a poll owned by `owner`, created at `now`.
    /// The options are stored separately.
    pub fn into_poll(self, owner: Identity, now: DateTime<Utc>) -> PollCore {
        PollCore {
            title: self.title,
            description: self.description,
            owner,
            created_at: now,
            expires_at: self.expires_at,
            is_active: self.is_active,
            allow_multiple_votes: self.allow_multiple_votes,
        }
    }
}

/// Changes to an existing poll. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `Some(None)`, i.e. an explicit `null`, removes the expiry.
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Distinguish a field set to `null` from a missing one.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl PollUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check the changed fields against the poll rules.
    ///
    /// Only what changes is checked: a poll whose expiry has since passed
    /// can still be retitled, and deactivating a multiple-vote poll is allowed.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), String> {
        if let Some(title) = &self.title {
            check_title(title)?;
        }
        if let Some(expires_at) = self.expires_at {
            check_expiry(expires_at, now)?;
        }
        Ok(())
    }

    /// The `$set` document applying this update.
    pub fn to_update_doc(&self) -> Document {
        let mut set = Document::new();
        if let Some(title) = &self.title {
            set.insert("title", title.clone());
        }
        if let Some(description) = &self.description {
            set.insert("description", description.clone());
        }
        if let Some(expires_at) = self.expires_at {
            let value = expires_at.map_or(Bson::Null, |t| BsonDateTime::from_chrono(t).into());
            set.insert("expires_at", value);
        }
        if let Some(is_active) = self.is_active {
            set.insert("is_active", is_active);
        }
        doc! { "$set": set }
    }
}

/// A poll as returned to clients, with live vote counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollDescription {
    pub id: ApiId,
    pub title: String,
    pub description: String,
    pub owner: Identity,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub is_expired: bool,
    pub total_votes: u64,
    pub option_count: usize,
    /// In display order.
    pub options: Vec<OptionDescription>,
    /// Options the requester has voted for; empty for anonymous requests.
    pub user_votes: Vec<ApiId>,
}

/// An option within a [`PollDescription`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDescription {
    pub id: ApiId,
    pub text: String,
    pub order: u32,
    pub vote_count: u64,
    pub vote_percentage: f64,
}

impl PollDescription {
    /// Describe `poll`, whose options must already be sorted by display order.
    pub fn new(
        poll: Poll,
        options: Vec<PollOption>,
        tally: &Tally,
        user_votes: Vec<Id>,
        now: DateTime<Utc>,
    ) -> Self {
        let options = options
            .into_iter()
            .map(|option| OptionDescription {
                id: option.id.into(),
                vote_count: tally.count(&option.id),
                vote_percentage: tally.percentage(&option.id),
                text: option.option.text,
                order: option.option.order,
            })
            .collect::<Vec<_>>();

        Self {
            id: poll.id.into(),
            is_expired: poll.is_expired(now),
            total_votes: tally.total(),
            option_count: options.len(),
            options,
            user_votes: user_votes.into_iter().map(Into::into).collect(),
            title: poll.poll.title,
            description: poll.poll.description,
            owner: poll.poll.owner,
            created_at: poll.poll.created_at,
            expires_at: poll.poll.expires_at,
            is_active: poll.poll.is_active,
            allow_multiple_votes: poll.poll.allow_multiple_votes,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl PollSpec {
        pub fn example() -> Self {
            Self {
                title: "Where should we go for lunch?".to_string(),
                description: "Team lunch on Friday".to_string(),
                expires_at: None,
                is_active: true,
                allow_multiple_votes: false,
                options: vec![
                    "Pizza".to_string(),
                    "Sushi".to_string(),
                    "Tacos".to_string(),
                ],
            }
        }

        pub fn multiple_example() -> Self {
            Self {
                title: "Which days suit you?".to_string(),
                allow_multiple_votes: true,
                options: vec![
                    "Monday".to_string(),
                    "Wednesday".to_string(),
                    "Friday".to_string(),
                ],
                ..Self::example()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn spec_defaults_match_an_open_single_vote_poll() {
        let spec: PollSpec =
            serde_json::from_str(r#"{"title": "Tea or coffee?", "options": ["Tea", "Coffee"]}"#)
                .unwrap();
        assert!(spec.is_active);
        assert!(!spec.allow_multiple_votes);
        assert_eq!(spec.description, "");
        assert_eq!(spec.expires_at, None);
    }

    #[test]
    fn update_distinguishes_null_from_missing() {
        let missing: PollUpdate = serde_json::from_str(r#"{"title": "New"}"#).unwrap();
        assert_eq!(missing.expires_at, None);

        let cleared: PollUpdate = serde_json::from_str(r#"{"expires_at": null}"#).unwrap();
        assert_eq!(cleared.expires_at, Some(None));
        assert_eq!(
            cleared.to_update_doc(),
            doc! { "$set": { "expires_at": Bson::Null } }
        );
    }

    #[test]
    fn update_validates_only_changed_fields() {
        let now = Utc::now();
        assert!(PollUpdate::default().validate(now).is_ok());

        let blank_title = PollUpdate {
            title: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(blank_title.validate(now).is_err());

        let past_expiry = PollUpdate {
            expires_at: Some(Some(now - Duration::minutes(1))),
            ..Default::default()
        };
        assert!(past_expiry.validate(now).is_err());

        let deactivate = PollUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(deactivate.validate(now).is_ok());
        assert_eq!(
            deactivate.to_update_doc(),
            doc! { "$set": { "is_active": false } }
        );
    }
}
