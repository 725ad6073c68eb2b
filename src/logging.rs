//! Request logging.
//!
//! Each request is numbered when it arrives. Its response line names the
//! handler, who made the request, how long it took and, for refused
//! requests, the reason code sent back to the client.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    request::{FromRequest, Outcome},
    Data, Orbit, Request, Response, Rocket,
};

use crate::model::common::identity::Identity;

/// Sequence number of a request, shared by all of its log lines.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl RequestId {
    /// Wraps around to zero on overflow.
    fn next() -> Self {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn of<'r>(req: &'r Request<'_>) -> &'r Self {
        req.local_cache(Self::next)
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "req{}", self.0)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r RequestId {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestId::of(req))
    }
}

/// The identity behind a request, once its token has been verified.
#[derive(Debug, Default)]
pub struct Requester(Option<Identity>);

impl Requester {
    /// Only the first identity recorded for a request is kept.
    pub fn record(req: &Request<'_>, identity: &Identity) {
        req.local_cache(|| Self(Some(identity.clone())));
    }

    pub fn of<'r>(req: &'r Request<'_>) -> &'r Self {
        req.local_cache(Self::default)
    }
}

impl Display for Requester {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(identity) => write!(f, "{}", identity),
            None => f.write_str("anonymous"),
        }
    }
}

/// The reason code of an error response, e.g. `DuplicateVote`.
#[derive(Debug, Default)]
pub struct Refusal(Option<&'static str>);

impl Refusal {
    pub fn record(req: &Request<'_>, reason: &'static str) {
        req.local_cache(|| Self(Some(reason)));
    }

    pub fn of<'r>(req: &'r Request<'_>) -> &'r Self {
        req.local_cache(Self::default)
    }
}

struct Arrival(Instant);

/// Logs the server's launch and shutdown, and a line for each request and
/// its response.
#[derive(Debug, Copy, Clone)]
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let scheme = if config.tls_enabled() { "https" } else { "http" };
        info!(
            "Accepting poll requests on {}://{}:{}",
            scheme, config.address, config.port
        );
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        req.local_cache(|| Arrival(Instant::now()));
        let source = req
            .client_ip()
            .map_or_else(|| "unknown address".to_string(), |ip| ip.to_string());
        info!(
            "->{} {} {} from {}",
            RequestId::of(req),
            req.method(),
            req.uri(),
            source
        );
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let elapsed = req.local_cache(|| Arrival(Instant::now())).0.elapsed();
        let handler = req
            .route()
            .and_then(|route| route.name.as_deref())
            .unwrap_or("no route");
        let status = res.status();

        let mut line = format!(
            "<-{} {} {} by {} in {}ms",
            RequestId::of(req),
            status,
            handler,
            Requester::of(req),
            elapsed.as_millis()
        );
        if let Refusal(Some(reason)) = Refusal::of(req) {
            line.push_str(&format!(", refused: {}", reason));
        }

        match status.class() {
            StatusClass::ServerError => error!("{}", line),
            StatusClass::ClientError => warn!("{}", line),
            _ => info!("{}", line),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutting down, finishing requests in flight");
    }
}

#[cfg(test)]
mod tests {
    use rocket::local::blocking::Client;

    use super::*;

    #[test]
    fn first_identity_and_reason_are_kept() {
        let client = Client::untracked(rocket::build()).unwrap();
        let req = client.get("/polls");
        assert_eq!(Requester::of(&req).to_string(), "anonymous");

        let req = client.get("/polls");
        Requester::record(&req, &Identity::voter_example());
        Requester::record(&req, &Identity::owner_example());
        assert_eq!(Requester::of(&req).to_string(), "bob");

        Refusal::record(&req, "PollExpired");
        Refusal::record(&req, "InternalError");
        assert!(matches!(Refusal::of(&req), Refusal(Some("PollExpired"))));
    }

    #[test]
    fn request_ids_are_stable_within_a_request() {
        let client = Client::untracked(rocket::build()).unwrap();
        let first = client.get("/");
        let second = client.get("/");
        let id = *RequestId::of(&first);
        assert_eq!(*RequestId::of(&first), id);
        assert_ne!(*RequestId::of(&second), id);
        assert!(id.to_string().starts_with("req"));
    }
}
