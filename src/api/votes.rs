use std::net::IpAddr;

use mongodb::{Client, Database};
use rocket::{response::status::Created, serde::json::Json, Route, State};

use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{
    aggregator,
    api::{
        auth::AuthToken,
        results::PollResults,
        vote::{VoteReceipt, VoteRequest},
    },
    common::clock::SharedClock,
    mongodb::Id,
    recorder,
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, poll_results]
}

#[post("/polls/<poll_id>/vote", data = "<request>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn cast_vote(
    token: AuthToken,
    poll_id: Id,
    request: Json<VoteRequest>,
    client_ip: Option<IpAddr>,
    request_id: &RequestId,
    db_client: &State<Client>,
    db: &State<Database>,
    clock: &State<SharedClock>,
) -> Result<Created<Json<VoteReceipt>>> {
    let option_id = *request.option_id;
    debug!(
        "{} {} votes for option {} in poll {}",
        request_id,
        token.identity(),
        option_id,
        poll_id
    );

    let vote = recorder::cast_vote(
        db_client,
        db,
        poll_id,
        option_id,
        token.identity(),
        client_ip.map(|ip| ip.to_string()),
        clock.now(),
    )
    .await?;

    let location = uri!(poll_results(poll_id)).to_string();
    Ok(Created::new(location).body(Json(vote.into())))
}

#[get("/polls/<poll_id>/results")]
async fn poll_results(
    poll_id: Id,
    db_client: &State<Client>,
    db: &State<Database>,
    clock: &State<SharedClock>,
) -> Result<Json<PollResults>> {
    let results = aggregator::compute_results(db_client, db, poll_id, clock.now()).await?;
    Ok(Json(results))
}
