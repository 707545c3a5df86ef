use std::net::IpAddr;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core vote data, as stored in the database.
///
/// Exactly one of `voter_id` and `ip_address` is set: an authenticated
/// requester is identified by account, an anonymous one only by network
/// address. The constructors are the only way to build one, which keeps
/// that invariant.
///
/// Votes are immutable once cast; there is no edit or delete path.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct VoteCore {
    pub poll_id: Id,
    pub option_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl VoteCore {
    /// A vote attributed to an authenticated account.
    pub fn by_user(poll_id: Id, option_id: Id, voter_id: Id) -> Self {
        Self {
            poll_id,
            option_id,
            voter_id: Some(voter_id),
            ip_address: None,
            created_at: Utc::now(),
        }
    }

    /// A vote attributed to a bare network address.
    pub fn by_address(poll_id: Id, option_id: Id, address: IpAddr) -> Self {
        Self {
            poll_id,
            option_id,
            voter_id: None,
            ip_address: Some(address.to_string()),
            created_at: Utc::now(),
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
