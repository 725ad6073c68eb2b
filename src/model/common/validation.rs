//! Validation of poll contents, as an explicit ordered list of rules.
//! The first rule violated is the one reported.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;

/// The user-supplied contents of a poll about to be created.
#[derive(Debug, Clone, Copy)]
pub struct PollDraft<'a> {
    pub title: &'a str,
    pub options: &'a [String],
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
}

type Rule = fn(&PollDraft<'_>, DateTime<Utc>) -> Result<(), String>;

const CREATE_RULES: [Rule; 6] = [
    title_not_empty,
    not_too_many_options,
    options_not_blank,
    enough_distinct_options,
    expiry_in_future,
    multiple_votes_need_active,
];

fn title_not_empty(draft: &PollDraft<'_>, _now: DateTime<Utc>) -> Result<(), String> {
    check_title(draft.title)
}

fn not_too_many_options(draft: &PollDraft<'_>, _now: DateTime<Utc>) -> Result<(), String> {
    if draft.options.len() > MAX_OPTIONS {
        return Err(format!(
            "At most {MAX_OPTIONS} options are allowed, got {}",
            draft.options.len()
        ));
    }
    Ok(())
}

fn options_not_blank(draft: &PollDraft<'_>, _now: DateTime<Utc>) -> Result<(), String> {
    if draft.options.iter().any(|text| text.trim().is_empty()) {
        return Err("Option text cannot be empty".to_string());
    }
    Ok(())
}

fn enough_distinct_options(draft: &PollDraft<'_>, _now: DateTime<Utc>) -> Result<(), String> {
    if dedup_options(draft.options).len() < MIN_OPTIONS {
        return Err(format!("At least {MIN_OPTIONS} unique options are required"));
    }
    Ok(())
}

fn expiry_in_future(draft: &PollDraft<'_>, now: DateTime<Utc>) -> Result<(), String> {
    check_expiry(draft.expires_at, now)
}

fn multiple_votes_need_active(draft: &PollDraft<'_>, _now: DateTime<Utc>) -> Result<(), String> {
    if draft.allow_multiple_votes && !draft.is_active {
        return Err("Multiple votes are not allowed for inactive polls".to_string());
    }
    Ok(())
}

/// Check a new poll, returning the de-duplicated option texts to store.
pub fn validate_draft(draft: &PollDraft<'_>, now: DateTime<Utc>) -> Result<Vec<String>, String> {
    CREATE_RULES.iter().try_for_each(|rule| rule(draft, now))?;
    Ok(dedup_options(draft.options))
}

/// A poll title must contain something other than whitespace.
pub fn check_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("Poll title cannot be empty".to_string());
    }
    Ok(())
}

/// An expiry time, if given, must be strictly after `now`.
pub fn check_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), String> {
    match expires_at {
        Some(expires_at) if expires_at <= now => {
            Err("Expiration date must be in the future".to_string())
        }
        _ => Ok(()),
    }
}

/// Remove options that repeat an earlier one, comparing trimmed,
/// case-folded text. The first occurrence is kept exactly as given.
pub fn dedup_options(options: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    options
        .iter()
        .filter(|text| seen.insert(text.trim().to_lowercase()))
        .cloned()
        .collect()
}
