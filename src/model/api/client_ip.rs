use std::net::IpAddr;

use rocket::{
    request::{FromRequest, Outcome},
    Request,
};

/// The requester's network address: the first `X-Forwarded-For` entry when
/// one is present and parseable, falling back to the connection's address.
///
/// Anonymous votes are keyed on this, so it is resolved once, explicitly,
/// rather than left to each handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(Option<IpAddr>);

impl ClientIp {
    pub fn into_inner(self) -> Option<IpAddr> {
        self.0
    }
}

/// Parse the client address out of an `X-Forwarded-For` header value:
/// the left-most entry is the originating client.
fn forwarded_ip(header: &str) -> Option<IpAddr> {
    header
        .split(',')
        .next()
        .and_then(|entry| entry.trim().parse().ok())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let forwarded = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(forwarded_ip);
        Outcome::Success(ClientIp(forwarded.or_else(|| req.client_ip())))
    }
}
