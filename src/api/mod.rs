use rocket::{serde::json::Json, Catcher, Request, Route};

use crate::error::ErrorBody;
use crate::logging::Refusal;

mod polls;
mod votes;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(polls::routes());
    routes.extend(votes::routes());
    routes
}

/// JSON bodies for errors raised by Rocket itself, e.g. a missing token or
/// a malformed request body, so clients always get the same error shape.
pub fn catchers() -> Vec<Catcher> {
    catchers![bad_request, unauthorized, not_found, unprocessable, internal_error]
}

#[catch(400)]
fn bad_request(req: &Request<'_>) -> Json<ErrorBody> {
    Refusal::record(req, "ValidationError");
    Json(ErrorBody::new("ValidationError", "Malformed request"))
}

#[catch(401)]
fn unauthorized(req: &Request<'_>) -> Json<ErrorBody> {
    Refusal::record(req, "Unauthenticated");
    Json(ErrorBody::new(
        "Unauthenticated",
        "A valid authentication token is required",
    ))
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> Json<ErrorBody> {
    Refusal::record(req, "NotFound");
    Json(ErrorBody::new(
        "NotFound",
        format!("No route for {} {}", req.method(), req.uri()),
    ))
}

#[catch(422)]
fn unprocessable(req: &Request<'_>) -> Json<ErrorBody> {
    Refusal::record(req, "ValidationError");
    Json(ErrorBody::new(
        "ValidationError",
        "The request body could not be parsed",
    ))
}

#[catch(500)]
fn internal_error(_req: &Request<'_>) -> Json<ErrorBody> {
    Json(ErrorBody::new("InternalError", "Internal server error"))
}
