#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use std::sync::Arc;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing};
use crate::logging::RequestLogger;
use crate::model::common::clock::{SharedClock, SystemClock};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;

/// Assemble the server. Configuration and the database connection are
/// loaded by fairings when the instance ignites.
pub fn build() -> Rocket<Build> {
    let clock: SharedClock = Arc::new(SystemClock);
    rocket::build()
        .attach(RequestLogger)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .manage(clock)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// Connect to the database named by `db_uri` in the Rocket figment.
#[cfg(test)]
async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("Could not connect to the test database")
}

/// Get a fresh, randomly named test database.
#[cfg(test)]
fn database() -> String {
    config::get_database_name()
}

/// Build a server around an existing database connection, bypassing the
/// database fairing so that tests can inspect the same database.
#[cfg(test)]
async fn rocket_for_db(db_client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = db_client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Failed to create test indexes");
    let clock: SharedClock = Arc::new(SystemClock);
    rocket::build()
        .attach(RequestLogger)
        .attach(ConfigFairing)
        .manage(clock)
        .manage(db_client)
        .manage(db)
        .mount("/", api::routes())
        .register("/", api::catchers())
}
