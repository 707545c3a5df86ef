use std::collections::HashMap;

use chrono::Utc;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::options::FindOptions;
use rocket::{
    futures::TryStreamExt, http::Status, response::status::Created, serde::json::Json, Route,
};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        poll::{CreatePollRequest, PollDescription, PollResults, UpdatePollRequest},
        token::AuthToken,
    },
    db::{NewPoll, Poll, Vote},
    mongodb::{Coll, Id},
};

use super::common::{count_votes, poll_by_id};

pub fn routes() -> Vec<Route> {
    routes![list_polls, create_poll, get_poll, update_poll, poll_results]
}

#[get("/polls")]
pub async fn list_polls(polls: Coll<Poll>, votes: Coll<Vote>) -> Result<Json<Vec<PollDescription>>> {
    let recent_first = FindOptions::builder().sort(doc! {"created_at": -1}).build();
    let all_polls = polls
        .find(None, recent_first)
        .await?
        .try_collect::<Vec<_>>()
        .await?;

    let mut descriptions = Vec::with_capacity(all_polls.len());
    for poll in all_polls {
        let counts = count_votes(&votes, &poll).await?;
        descriptions.push(PollDescription::new(poll, &counts));
    }
    Ok(Json(descriptions))
}

#[post("/polls", data = "<spec>", format = "json")]
pub async fn create_poll(
    token: AuthToken,
    spec: Json<CreatePollRequest>,
    new_polls: Coll<NewPoll>,
) -> Result<Created<Json<PollDescription>>> {
    spec.validate(Utc::now())?;

    let CreatePollRequest {
        question,
        expiry_date,
        options,
    } = spec.0;

    // The options are embedded in the poll document, so this insert is the
    // whole creation, atomically.
    let poll = NewPoll::new(question, expiry_date, options, token.id, token.username);
    let id: Id = new_polls
        .insert_one(&poll, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Safe because the ID comes directly from the database.
        .into();

    let poll = Poll { id, poll };
    let description = PollDescription::new(poll, &HashMap::new());
    Ok(Created::new(format!("/polls/{id}")).body(Json(description)))
}

#[get("/polls/<poll_id>")]
pub async fn get_poll(
    poll_id: Id,
    polls: Coll<Poll>,
    votes: Coll<Vote>,
) -> Result<Json<PollDescription>> {
    let poll = poll_by_id(poll_id, &polls).await?;
    let counts = count_votes(&votes, &poll).await?;
    Ok(Json(PollDescription::new(poll, &counts)))
}

#[put("/polls/<poll_id>", data = "<update>", format = "json")]
pub async fn update_poll(
    token: AuthToken,
    poll_id: Id,
    update: Json<UpdatePollRequest>,
    polls: Coll<Poll>,
    votes: Coll<Vote>,
) -> Result<Json<PollDescription>> {
    update.validate(Utc::now())?;

    let poll = poll_by_id(poll_id, &polls).await?;
    if poll.created_by != token.id {
        return Err(Error::Status(
            Status::Forbidden,
            "Only the poll's creator may update it".to_string(),
        ));
    }

    // Only the question text and expiry are updatable; options are immutable.
    let mut set = doc! {};
    if let Some(question) = &update.question {
        set.insert("question", question.as_str());
    }
    if let Some(expiry) = update.expiry_date {
        set.insert("expiry_date", BsonDateTime::from_chrono(expiry));
    }
    if !set.is_empty() {
        polls
            .update_one(poll_id.as_doc(), doc! {"$set": set}, None)
            .await?;
    }

    let poll = poll_by_id(poll_id, &polls).await?;
    let counts = count_votes(&votes, &poll).await?;
    Ok(Json(PollDescription::new(poll, &counts)))
}

#[get("/polls/<poll_id>/results")]
pub async fn poll_results(
    poll_id: Id,
    polls: Coll<Poll>,
    votes: Coll<Vote>,
) -> Result<Json<PollResults>> {
    let poll = poll_by_id(poll_id, &polls).await?;
    let counts = count_votes(&votes, &poll).await?;
    Ok(Json(PollResults::new(poll, &counts)))
}
