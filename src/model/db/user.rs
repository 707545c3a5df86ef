use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core account data.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct UserCore {
    pub username: String,
    pub password_hash: String,
}

impl UserCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Unwrap safe because stored hashes only ever come from
        // `TryFrom<Credentials>`, so they are always well-formed.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap()
    }
}

/// An account without an ID.
pub type NewUser = UserCore;

/// An account from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use crate::model::api::auth::Credentials;

    impl UserCore {
        pub fn example() -> Self {
            NewUser::try_from(Credentials::example()).unwrap()
        }
    }
}
