use rocket::{
    fairing::{Fairing, Info, Kind},
    http::uri::Origin,
    Data, Request, Route,
};

pub mod auth;
mod common;
pub mod polls;
pub mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(polls::routes());
    routes.extend(voting::routes());
    routes
}

/// Strips trailing slashes before routing, so `/polls/` and `/polls` reach
/// the same handler.
#[derive(Debug, Copy, Clone)]
pub struct TrailingSlashFairing;

#[rocket::async_trait]
impl Fairing for TrailingSlashFairing {
    fn info(&self) -> Info {
        Info {
            name: "Trailing slash normalisation",
            kind: Kind::Request,
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let path = req.uri().path().as_str();
        if path.len() > 1 && path.ends_with('/') {
            let mut normalised = path.trim_end_matches('/').to_string();
            if let Some(query) = req.uri().query() {
                normalised = format!("{normalised}?{query}");
            }
            // An unparseable rewrite leaves the URI as received.
            if let Ok(uri) = Origin::parse_owned(normalised) {
                req.set_uri(uri);
            }
        }
    }
}
