use chrono::Utc;
use mongodb::bson::doc;
use rocket::{response::status::Created, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{client_ip::ClientIp, poll::VoteReceipt, token::AuthToken},
    db::{NewVote, Poll, Vote},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::common::poll_by_id;

pub fn routes() -> Vec<Route> {
    routes![cast_vote]
}

#[post("/polls/<poll_id>/vote/<option_id>")]
pub async fn cast_vote(
    token: Option<AuthToken>,
    client_ip: ClientIp,
    poll_id: Id,
    option_id: Id,
    polls: Coll<Poll>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
) -> Result<Created<Json<VoteReceipt>>> {
    // Existence checks: the poll, then the option within it.
    let poll = poll_by_id(poll_id, &polls).await?;
    let option = poll.option(option_id).ok_or_else(|| {
        Error::not_found(format!("Option with ID '{option_id}' in poll '{poll_id}'"))
    })?;

    if poll.has_expired(Utc::now()) {
        return Err(Error::bad_request("Poll has expired".to_string()));
    }

    // Identity-first, address-fallback attribution.
    let vote = match &token {
        Some(token) => NewVote::by_user(poll.id, option.id, token.id),
        None => {
            let address = client_ip.into_inner().ok_or_else(|| {
                Error::bad_request("Could not determine the client address".to_string())
            })?;
            NewVote::by_address(poll.id, option.id, address)
        }
    };

    // Fast-path duplicate check: one vote per requester per poll, across
    // every option of the poll...
    let mut prior = doc! { "poll_id": poll.id };
    match (&vote.voter_id, &vote.ip_address) {
        (Some(voter_id), _) => prior.insert("voter_id", *voter_id),
        (_, Some(address)) => prior.insert("ip_address", address.as_str()),
        _ => unreachable!("vote constructors always set an identity"),
    };
    if votes.find_one(prior, None).await?.is_some() {
        return Err(already_voted());
    }

    // ...but the unique vote indexes are what actually arbitrate a race
    // between two near-simultaneous requests from the same requester.
    let result = new_votes.insert_one(&vote, None).await;
    if is_duplicate_key_error(result.as_ref().map(|_| ())) {
        return Err(already_voted());
    }
    let id: Id = result?
        .inserted_id
        .as_object_id()
        .unwrap() // Safe because the ID comes directly from the database.
        .into();

    // Bump the cached tally. Reads always recount from the vote records, so
    // a failure between the insert and this update cannot skew results.
    polls
        .update_one(
            doc! { "_id": poll.id, "options.id": option.id },
            doc! { "$inc": { "options.$.tally": 1 } },
            None,
        )
        .await?;

    let receipt = VoteReceipt::new(Vote { id, vote }, token.map(|token| token.username));
    Ok(Created::new(format!("/polls/{poll_id}/results")).body(Json(receipt)))
}

fn already_voted() -> Error {
    Error::bad_request("You have already voted in this poll".to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::Client,
        serde::json::{serde_json::json, Value},
    };

    use crate::model::api::{auth::Credentials, poll::PollDescription};
    use crate::model::db::{NewPoll, User};

    use super::*;

    async fn create_best_color(client: &Client) -> PollDescription {
        let response = client
            .post(uri!(crate::api::polls::create_poll))
            .header(ContentType::JSON)
            .body(json!({ "question": "Best color?", "options": ["Red", "Blue"] }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        response.into_json().await.unwrap()
    }

    async fn vote<'a>(
        client: &'a Client,
        poll_id: &str,
        option_id: &str,
    ) -> rocket::local::asynchronous::LocalResponse<'a> {
        client
            .post(format!("/polls/{poll_id}/vote/{option_id}"))
            .dispatch()
            .await
    }

    #[backend_test(user)]
    async fn vote_and_report_results(client: Client) {
        // Created (as example user A) with two options and no votes.
        let poll = create_best_color(&client).await;
        let (red, blue) = (&poll.options[0], &poll.options[1]);

        // Switch to user B.
        for route in [
            uri!(crate::api::auth::register),
            uri!(crate::api::auth::login),
        ] {
            client
                .post(route)
                .header(ContentType::JSON)
                .body(json!(Credentials::example2()).to_string())
                .dispatch()
                .await;
        }

        // First vote lands on Red.
        let response = vote(&client, &poll.id, &red.id).await;
        assert_eq!(Status::Created, response.status());
        let receipt: VoteReceipt = response.into_json().await.unwrap();
        assert_eq!(Some(Credentials::example2().username), receipt.voted_by);
        assert_eq!(None, receipt.ip_address);

        // A second vote in the same poll is a conflict, whatever the option.
        let response = vote(&client, &poll.id, &blue.id).await;
        assert_eq!(Status::BadRequest, response.status());

        // Results are live and unchanged by the rejected vote.
        let response = client
            .get(format!("/polls/{}/results", poll.id))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results: Value = response.into_json().await.unwrap();
        let expected = json!({
            "poll": "Best color?",
            "results": [
                { "id": red.id, "text": "Red", "votes_count": 1 },
                { "id": blue.id, "text": "Blue", "votes_count": 0 },
            ],
        });
        assert_eq!(expected, results);
    }

    #[backend_test(user)]
    async fn anonymous_votes_keyed_on_address(client: Client) {
        let poll = create_best_color(&client).await;
        let (red, blue) = (&poll.options[0], &poll.options[1]);
        client
            .delete(uri!(crate::api::auth::logout))
            .dispatch()
            .await;

        // The first X-Forwarded-For entry identifies the requester.
        let response = client
            .post(format!("/polls/{}/vote/{}", poll.id, red.id))
            .header(Header::new("X-Forwarded-For", "203.0.113.7, 10.0.0.1"))
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let receipt: VoteReceipt = response.into_json().await.unwrap();
        assert_eq!(None, receipt.voted_by);
        assert_eq!(Some("203.0.113.7".to_string()), receipt.ip_address);

        // Same address, any option: conflict.
        let response = client
            .post(format!("/polls/{}/vote/{}", poll.id, blue.id))
            .header(Header::new("X-Forwarded-For", "203.0.113.7"))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // A different address may still vote.
        let response = client
            .post(format!("/polls/{}/vote/{}", poll.id, blue.id))
            .header(Header::new("X-Forwarded-For", "203.0.113.8"))
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        let poll: PollDescription = client
            .get(format!("/polls/{}", poll.id))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert!(poll.options.iter().all(|option| option.votes_count == 1));
    }

    #[backend_test(user)]
    async fn vote_on_expired_poll_rejected(client: Client, new_polls: Coll<NewPoll>, votes: Coll<Vote>) {
        // Expired polls cannot be created through the API, so plant one.
        let mut poll = NewPoll::new(
            "Too late?".to_string(),
            None,
            vec!["Yes".to_string(), "No".to_string()],
            Id::new(),
            "ghost".to_string(),
        );
        poll.expiry_date = Some(Utc::now() - Duration::hours(1));
        let option_id = poll.options[0].id;
        let poll_id = new_polls
            .insert_one(&poll, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap();

        let response = vote(&client, &poll_id.to_hex(), &option_id.to_string()).await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(0, votes.count_documents(None, None).await.unwrap());
    }

    #[backend_test(user)]
    async fn vote_on_missing_poll_or_option(client: Client, votes: Coll<Vote>) {
        // Nonexistent poll.
        let response = vote(&client, &Id::new().to_string(), &Id::new().to_string()).await;
        assert_eq!(Status::NotFound, response.status());

        // Existing poll, option from some other poll.
        let poll = create_best_color(&client).await;
        let response = vote(&client, &poll.id, &Id::new().to_string()).await;
        assert_eq!(Status::NotFound, response.status());

        assert_eq!(0, votes.count_documents(None, None).await.unwrap());
    }

    #[backend_test(user)]
    async fn preexisting_vote_is_a_conflict(client: Client, users: Coll<User>, new_votes: Coll<NewVote>) {
        let poll = create_best_color(&client).await;

        // Plant a vote for the logged-in user directly in the database.
        let with_username = doc! { "username": &Credentials::example().username };
        let voter = users.find_one(with_username, None).await.unwrap().unwrap();
        new_votes
            .insert_one(
                NewVote::by_user(
                    poll.id.parse().unwrap(),
                    poll.options[1].id.parse().unwrap(),
                    voter.id,
                ),
                None,
            )
            .await
            .unwrap();

        let response = vote(&client, &poll.id, &poll.options[0].id).await;
        assert_eq!(Status::BadRequest, response.status());
    }
}
