use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::db::user::NewUser;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Raw account credentials, received from a user. These are never stored
/// directly, since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<Credentials> for NewUser {
    type Error = ();

    /// Convert [`Credentials`] to a new account by hashing the password.
    /// This enforces that the username is non-empty and the password meets
    /// the minimum length.
    fn try_from(cred: Credentials) -> Result<Self, Self::Error> {
        if cred.username.trim().is_empty() || cred.password.len() < MIN_PASSWORD_LENGTH {
            return Err(());
        }

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(cred.password.as_bytes(), &salt, &Config::default()).unwrap(); // Safe because the default `Config` is valid.
        Ok(Self {
            username: cred.username,
            password_hash,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_round_trip() {
        let user = NewUser::try_from(Credentials::example()).unwrap();
        assert_ne!(user.password_hash, Credentials::example().password);
        assert!(user.verify_password(Credentials::example().password));
        assert!(!user.verify_password(Credentials::example2().password));
    }

    #[test]
    fn weak_credentials_rejected() {
        assert!(NewUser::try_from(Credentials::empty()).is_err());
        assert!(NewUser::try_from(Credentials {
            username: "carol".into(),
            password: "short".into(),
        })
        .is_err());
        assert!(NewUser::try_from(Credentials {
            username: "   ".into(),
            password: "long enough password".into(),
        })
        .is_err());
    }
}
