use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::db::{Poll, Vote};
use crate::model::mongodb::Id;

/// Shape of a poll-creation request: the question, an optional expiry and
/// the option texts, all in one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    pub options: Vec<String>,
}

impl CreatePollRequest {
    /// Validate the business rules: non-empty question, at least one
    /// non-empty option, no duplicate options, expiry not in the past.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(Error::bad_request("question must not be empty".to_string()));
        }
        if self.options.is_empty() {
            return Err(Error::bad_request(
                "a poll needs at least one option".to_string(),
            ));
        }
        if self.options.iter().any(|text| text.trim().is_empty()) {
            return Err(Error::bad_request(
                "option text must not be empty".to_string(),
            ));
        }
        let distinct = self.options.iter().collect::<HashSet<_>>();
        if distinct.len() != self.options.len() {
            return Err(Error::bad_request(
                "options must not contain duplicates".to_string(),
            ));
        }
        validate_expiry(self.expiry_date, now)
    }
}

/// Shape of a poll-update request. Only the question text and expiry are
/// updatable; the option set is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePollRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

impl UpdatePollRequest {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if let Some(question) = &self.question {
            if question.trim().is_empty() {
                return Err(Error::bad_request("question must not be empty".to_string()));
            }
        }
        validate_expiry(self.expiry_date, now)
    }
}

fn validate_expiry(expiry_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<()> {
    match expiry_date {
        Some(expiry) if expiry < now => Err(Error::bad_request(
            "expiry_date cannot be in the past".to_string(),
        )),
        _ => Ok(()),
    }
}

/// A poll as returned by the API, options nested with live vote counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollDescription {
    pub id: String,
    pub question: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    pub options: Vec<OptionDescription>,
}

impl PollDescription {
    /// Describe a poll, taking vote counts from the given per-option tally
    /// (options without an entry have no votes).
    pub fn new(poll: Poll, counts: &HashMap<Id, u64>) -> Self {
        let options = poll
            .options
            .iter()
            .map(|option| OptionDescription {
                id: option.id.to_string(),
                text: option.text.clone(),
                votes_count: counts.get(&option.id).copied().unwrap_or(0),
            })
            .collect();
        Self {
            id: poll.id.to_string(),
            question: poll.poll.question,
            created_by: poll.poll.creator_username,
            created_at: poll.poll.created_at,
            expiry_date: poll.poll.expiry_date,
            options,
        }
    }
}

/// One option with its live vote count; also the per-option entry in the
/// results report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDescription {
    pub id: String,
    pub text: String,
    pub votes_count: u64,
}

/// The results report for one poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResults {
    pub poll: String,
    pub results: Vec<OptionDescription>,
}

impl PollResults {
    pub fn new(poll: Poll, counts: &HashMap<Id, u64>) -> Self {
        let description = PollDescription::new(poll, counts);
        Self {
            poll: description.question,
            results: description.options,
        }
    }
}

/// Confirmation of a cast vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub id: String,
    pub poll_id: String,
    pub option_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VoteReceipt {
    /// Describe a recorded vote, attributing it to the username when the
    /// vote was cast by an account.
    pub fn new(vote: Vote, username: Option<String>) -> Self {
        Self {
            id: vote.id.to_string(),
            poll_id: vote.poll_id.to_string(),
            option_id: vote.option_id.to_string(),
            voted_by: username,
            ip_address: vote.vote.ip_address,
            created_at: vote.vote.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    fn request() -> CreatePollRequest {
        CreatePollRequest {
            question: "Best color?".to_string(),
            expiry_date: None,
            options: vec!["Red".to_string(), "Blue".to_string()],
        }
    }

    #[test]
    fn valid_request_passes() {
        let now = Utc::now();
        assert!(request().validate(now).is_ok());

        let mut future_expiry = request();
        future_expiry.expiry_date = Some(now + Duration::days(1));
        assert!(future_expiry.validate(now).is_ok());
    }

    #[test]
    fn empty_question_rejected() {
        let mut request = request();
        request.question = "  ".to_string();
        assert!(request.validate(Utc::now()).is_err());
    }

    #[test]
    fn option_payload_rules() {
        let now = Utc::now();

        let mut no_options = request();
        no_options.options.clear();
        assert!(no_options.validate(now).is_err());

        let mut blank_option = request();
        blank_option.options.push(" ".to_string());
        assert!(blank_option.validate(now).is_err());

        let mut duplicates = request();
        duplicates.options.push("Red".to_string());
        assert!(duplicates.validate(now).is_err());
    }

    #[test]
    fn past_expiry_rejected() {
        let now = Utc::now();

        let mut request = request();
        request.expiry_date = Some(now - Duration::seconds(1));
        assert!(request.validate(now).is_err());

        let update = UpdatePollRequest {
            question: None,
            expiry_date: Some(now - Duration::seconds(1)),
        };
        assert!(update.validate(now).is_err());
    }
}
