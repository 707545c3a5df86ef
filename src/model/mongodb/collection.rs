use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    poll::{NewPoll, Poll},
    user::{NewUser, User},
    vote::{NewVote, Vote},
};

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

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// User collections
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for NewUser {
    const NAME: &'static str = USERS;
}

// Poll collections
const POLLS: &str = "polls";
impl MongoCollection for Poll {
    const NAME: &'static str = POLLS;
}
impl MongoCollection for NewPoll {
    const NAME: &'static str = POLLS;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

/// Ensure that all the required indexes exist on the given database.
///
/// The vote indexes are the authoritative one-vote-per-requester-per-poll
/// constraint; handler-level duplicate queries are only a fast path. They are
/// partial so that account votes and address votes never collide on the
/// field the other kind leaves unset.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // User collection.
    let user_index = IndexModel::builder()
        .keys(doc! {"username": 1})
        .options(unique)
        .build();
    Coll::<User>::from_db(db)
        .create_index(user_index, None)
        .await?;

    // Vote collection: one vote per account per poll...
    let account_unique = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {"voter_id": {"$exists": true}})
        .build();
    let account_index = IndexModel::builder()
        .keys(doc! {"poll_id": 1, "voter_id": 1})
        .options(account_unique)
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(account_index, None)
        .await?;

    // ...and one vote per network address per poll.
    let address_unique = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {"ip_address": {"$exists": true}})
        .build();
    let address_index = IndexModel::builder()
        .keys(doc! {"poll_id": 1, "ip_address": 1})
        .options(address_unique)
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(address_index, None)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::Database;

    use crate::model::db::vote::NewVote;
    use crate::model::mongodb::{is_duplicate_key_error, Id};

    #[backend_test]
    async fn vote_indexes_reject_duplicates(db: Database, votes: Coll<NewVote>) {
        let poll_id = Id::new();
        let option_a = Id::new();
        let option_b = Id::new();
        let voter = Id::new();

        // First vote goes through.
        votes
            .insert_one(NewVote::by_user(poll_id, option_a, voter), None)
            .await
            .unwrap();

        // Same voter, same poll, different option: rejected by the index.
        let result = votes
            .insert_one(NewVote::by_user(poll_id, option_b, voter), None)
            .await;
        assert!(is_duplicate_key_error(result.as_ref().map(|_| ())));

        // Address votes have the same constraint...
        let address = "203.0.113.7".parse().unwrap();
        votes
            .insert_one(NewVote::by_address(poll_id, option_a, address), None)
            .await
            .unwrap();
        let result = votes
            .insert_one(NewVote::by_address(poll_id, option_b, address), None)
            .await;
        assert!(is_duplicate_key_error(result.as_ref().map(|_| ())));

        // ...but do not collide with account votes, and other polls are unaffected.
        votes
            .insert_one(NewVote::by_user(Id::new(), option_a, voter), None)
            .await
            .unwrap();
    }
}
