use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{Credentials, MIN_PASSWORD_LENGTH},
            token::{AuthToken, AUTH_TOKEN_COOKIE},
        },
        db::{NewUser, User},
        mongodb::{is_duplicate_key_error, Coll},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![register, login, logout]
}

#[post("/auth/register", data = "<credentials>", format = "json")]
pub async fn register(credentials: Json<Credentials>, users: Coll<NewUser>) -> Result<Status> {
    let user = NewUser::try_from(credentials.0).map_err(|_| {
        Error::bad_request(format!(
            "username must be non-empty and the password at least {MIN_PASSWORD_LENGTH} characters"
        ))
    })?;

    // The unique username index arbitrates races between identical registrations.
    let result = users.insert_one(&user, None).await;
    if is_duplicate_key_error(result.as_ref().map(|_| ())) {
        return Err(Error::bad_request(format!(
            "Username '{}' is already taken",
            user.username
        )));
    }
    result?;

    Ok(Status::Created)
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<Credentials>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<()> {
    let with_username = doc! {
        "username": &credentials.username
    };

    let user = users
        .find_one(with_username, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No account found with the provided username and password combination.".to_string(),
            )
        })?;

    let token = AuthToken::for_user(&user);
    cookies.add(token.into_cookie(config));

    Ok(())
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[cfg(test)]
mod tests {
    use rocket::{http::ContentType, local::asynchronous::Client, serde::json::serde_json::json};

    use super::*;

    #[backend_test]
    async fn register_and_login(client: Client, users: Coll<User>) {
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(Credentials::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        // The account exists and the password is not stored in plaintext.
        let with_username = doc! { "username": &Credentials::example().username };
        let user = users.find_one(with_username, None).await.unwrap().unwrap();
        assert_ne!(user.password_hash, Credentials::example().password);

        // Valid credentials get an auth cookie.
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!(Credentials::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
    }

    #[backend_test]
    async fn login_wrong_password(client: Client, users: Coll<NewUser>) {
        users
            .insert_one(NewUser::example(), None)
            .await
            .unwrap();

        let mut credentials = Credentials::example();
        credentials.password = "not the password".to_string();
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Unauthorized, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
    }

    #[backend_test]
    async fn register_duplicate_username(client: Client) {
        let first = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(Credentials::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, first.status());

        // Same username, different password: still taken.
        let mut credentials = Credentials::example();
        credentials.password = "another password".to_string();
        let second = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, second.status());
    }

    #[backend_test]
    async fn register_weak_credentials(client: Client) {
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(Credentials::empty()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(user)]
    async fn logout_clears_cookie(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let response = client.delete(uri!(logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
    }
}
