use rocket::{
    http::{Status, StatusClass},
    response::Responder,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] mongodb::error::Error),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("{0}: {1}")]
    Status(Status, String),
}

impl Error {
    /// A 404 for the described resource.
    pub fn not_found(what: String) -> Self {
        Self::Status(Status::NotFound, format!("{what} not found"))
    }

    /// A 400 with the given explanation.
    pub fn bad_request(msg: String) -> Self {
        Self::Status(Status::BadRequest, msg)
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = match &self {
            Self::Db(_) | Self::Jwt(_) => Status::InternalServerError,
            Self::Status(status, _) => *status,
        };
        if status.class() == StatusClass::ServerError {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        Err(status)
    }
}
