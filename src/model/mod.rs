pub mod aggregator;
pub mod api;
pub mod common;
pub mod db;
pub mod lifecycle;
pub mod mongodb;
pub mod recorder;
