use mongodb::{Client, Database};
use rocket::{http::Status, response::status::Created, serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    aggregator,
    api::{
        auth::AuthToken,
        poll::{PollDescription, PollSpec, PollUpdate},
    },
    common::{clock::SharedClock, tally::Tally},
    lifecycle,
    mongodb::Id,
};

pub fn routes() -> Vec<Route> {
    routes![create_poll, get_poll, update_poll, delete_poll]
}

#[post("/polls", data = "<spec>", format = "json")]
async fn create_poll(
    token: AuthToken,
    spec: Json<PollSpec>,
    db_client: &State<Client>,
    db: &State<Database>,
    clock: &State<SharedClock>,
) -> Result<Created<Json<PollDescription>>> {
    let now = clock.now();
    let (poll, options) =
        lifecycle::create_poll(db_client, db, spec.into_inner(), token.into_identity(), now)
            .await?;

    let location = uri!(get_poll(poll.id)).to_string();
    // A new poll has no votes yet.
    let description = PollDescription::new(poll, options, &Tally::from_counts([]), Vec::new(), now);
    Ok(Created::new(location).body(Json(description)))
}

#[get("/polls/<poll_id>")]
async fn get_poll(
    token: Option<AuthToken>,
    poll_id: Id,
    db_client: &State<Client>,
    db: &State<Database>,
    clock: &State<SharedClock>,
) -> Result<Json<PollDescription>> {
    let requester = token.as_ref().map(AuthToken::identity);
    let description =
        aggregator::describe_poll(db_client, db, poll_id, requester, clock.now()).await?;
    Ok(Json(description))
}

#[patch("/polls/<poll_id>", data = "<update>", format = "json")]
async fn update_poll(
    token: AuthToken,
    poll_id: Id,
    update: Json<PollUpdate>,
    db_client: &State<Client>,
    db: &State<Database>,
    clock: &State<SharedClock>,
) -> Result<Json<PollDescription>> {
    let now = clock.now();
    let requester = token.identity();
    lifecycle::update_poll(db_client, db, poll_id, update.into_inner(), requester, now).await?;

    let description =
        aggregator::describe_poll(db_client, db, poll_id, Some(requester), now).await?;
    Ok(Json(description))
}

#[delete("/polls/<poll_id>")]
async fn delete_poll(
    token: AuthToken,
    poll_id: Id,
    db_client: &State<Client>,
    db: &State<Database>,
) -> Result<Status> {
    lifecycle::delete_poll(db_client, db, poll_id, token.identity()).await?;
    Ok(Status::NoContent)
}
