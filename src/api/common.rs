use std::collections::HashMap;

use mongodb::bson::{doc, Bson};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    db::{Poll, Vote},
    mongodb::{Coll, Id},
};

/// Return a poll from the database by ID, or Not-Found.
pub async fn poll_by_id(poll_id: Id, polls: &Coll<Poll>) -> Result<Poll> {
    polls
        .find_one(poll_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Poll with ID '{poll_id}'")))
}

/// Live per-option vote counts for a poll.
///
/// Always counted from the vote records at request time; the cached option
/// tallies are never consulted.
pub async fn count_votes(votes: &Coll<Vote>, poll: &Poll) -> Result<HashMap<Id, u64>> {
    let per_option = vec![
        doc! { "$match": { "poll_id": poll.id } },
        doc! { "$group": { "_id": "$option_id", "count": { "$sum": 1 } } },
    ];

    let mut counts = HashMap::new();
    let mut groups = votes.aggregate(per_option, None).await?;
    while let Some(group) = groups.try_next().await? {
        let option_id = match group.get_object_id("_id") {
            Ok(option_id) => option_id,
            Err(_) => continue,
        };
        let count = match group.get("count") {
            Some(Bson::Int32(count)) => *count as u64,
            Some(Bson::Int64(count)) => *count as u64,
            _ => continue,
        };
        counts.insert(option_id.into(), count);
    }
    Ok(counts)
}
