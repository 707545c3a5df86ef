use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{serde_option_datetime, Id};

/// Core poll data, as stored in the database.
///
/// Options are embedded in the poll document, so a poll and its options are
/// created (and would be destroyed) together, atomically.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PollCore {
    /// The question being asked.
    pub question: String,
    /// Account that created the poll.
    pub created_by: Id,
    /// Denormalised creator username, for display.
    pub creator_username: String,
    /// Creation time, system-assigned.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    /// Optional expiry; votes are rejected after this instant.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_option_datetime"
    )]
    pub expiry_date: Option<DateTime<Utc>>,
    /// The selectable answers. Immutable after creation.
    pub options: Vec<PollOption>,
}

impl PollCore {
    /// Create a new poll with one option per supplied text, tallies at zero.
    pub fn new(
        question: String,
        expiry_date: Option<DateTime<Utc>>,
        options: Vec<String>,
        created_by: Id,
        creator_username: String,
    ) -> Self {
        Self {
            question,
            created_by,
            creator_username,
            created_at: Utc::now(),
            expiry_date,
            options: options.into_iter().map(PollOption::new).collect(),
        }
    }

    /// Look up an option within this poll.
    pub fn option(&self, option_id: Id) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }

    /// Has this poll expired at the given instant?
    /// Polls without an expiry never expire.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry_date, Some(expiry) if expiry < now)
    }
}

/// A single selectable answer.
///
/// `tally` is a derived cache, bumped when a vote lands; the authoritative
/// count is always the vote records, which every read path recounts.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: Id,
    pub text: String,
    pub tally: u32,
}

impl PollOption {
    fn new(text: String) -> Self {
        Self {
            id: Id::new(),
            text,
            tally: 0,
        }
    }
}

/// A poll without an ID.
pub type NewPoll = PollCore;

/// A poll from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Poll {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub poll: PollCore,
}

impl Deref for Poll {
    type Target = PollCore;

    fn deref(&self) -> &Self::Target {
        &self.poll
    }
}

impl DerefMut for Poll {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    fn poll(expiry_date: Option<DateTime<Utc>>) -> PollCore {
        PollCore {
            question: "Best color?".to_string(),
            created_by: Id::new(),
            creator_username: "alice112".to_string(),
            created_at: Utc::now(),
            expiry_date,
            options: vec!["Red", "Blue"]
                .into_iter()
                .map(|text| PollOption::new(text.to_string()))
                .collect(),
        }
    }

    #[test]
    fn expiry() {
        let now = Utc::now();
        assert!(!poll(None).has_expired(now));
        assert!(!poll(Some(now + Duration::hours(1))).has_expired(now));
        assert!(poll(Some(now - Duration::hours(1))).has_expired(now));
    }

    #[test]
    fn option_lookup_is_scoped_to_the_poll() {
        let poll = poll(None);
        let option = &poll.options[1];
        assert_eq!(poll.option(option.id), Some(option));
        assert_eq!(poll.option(Id::new()), None);
    }
}
